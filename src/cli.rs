// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use deck_device::ScaleMode;
use deck_transport::Color;

#[derive(Parser)]
#[command(name = "deckd")]
#[command(author, version, about = "Stream Deck class device driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/deckd/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Serial number of the device to use (default: first found)
    #[arg(long, global = true)]
    pub serial: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Query Commands ===
    /// List attached devices
    #[command(visible_alias = "ls")]
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show device identity and capabilities
    #[command(visible_aliases = ["version", "ver"])]
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    // === Set Commands ===
    /// Set backlight brightness
    #[command(visible_alias = "b")]
    Brightness {
        /// Brightness in percent (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Fill the whole surface, or one key, with a color
    Fill {
        /// Color as #rrggbb
        color: Color,
        /// Fill only this key
        #[arg(long)]
        key: Option<u8>,
    },

    /// Show an image on the surface, one key, or the strip
    #[command(visible_alias = "img")]
    Image {
        /// Image file (PNG or JPEG)
        file: PathBuf,
        /// Draw on this key only
        #[arg(long, conflicts_with = "strip")]
        key: Option<u8>,
        /// Draw on the touch strip
        #[arg(long)]
        strip: bool,
        /// Scaling (fit, fill, stretch)
        #[arg(long)]
        scale: Option<ScaleMode>,
    },

    /// Reset the display to the vendor logo
    Logo,

    // === Monitoring ===
    /// Print input events until Ctrl-C
    #[command(visible_alias = "w")]
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_image_args() {
        let cli = Cli::try_parse_from(["deckd", "image", "a.png", "--key", "3", "--scale", "fill"])
            .unwrap();
        match cli.command {
            Commands::Image {
                key, strip, scale, ..
            } => {
                assert_eq!(key, Some(3));
                assert!(!strip);
                assert_eq!(scale, Some(ScaleMode::Fill));
            }
            _ => panic!("wrong subcommand"),
        }
        assert!(Cli::try_parse_from(["deckd", "image", "a.png", "--key", "1", "--strip"]).is_err());
    }

    #[test]
    fn test_brightness_range() {
        assert!(Cli::try_parse_from(["deckd", "brightness", "100"]).is_ok());
        assert!(Cli::try_parse_from(["deckd", "brightness", "101"]).is_err());
    }
}
