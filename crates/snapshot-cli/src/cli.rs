//! CLI argument definitions for Snapshot.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use snapshot_store::{ExpiryRequest, StoreResult, TimeUnit};

/// Snapshot -- photos that delete themselves.
#[derive(Parser)]
#[command(
    name = "snapshot",
    version,
    about = "Snapshot -- photos that delete themselves",
    long_about = "Save images with an expiry date. Expired images are removed \
                  by `expire` or continuously by `watch`."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "snapshot.toml")]
    pub config: PathBuf,

    /// Override the data directory from the configuration.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Default log level when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save an image file with an expiry.
    Save {
        /// Image file to store.
        path: PathBuf,

        #[command(flatten)]
        expiry: ExpiryArgs,
    },

    /// List stored images.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Copy a stored image out to a file.
    Show {
        /// Stored file name, as printed by `list`.
        file_name: String,

        /// Destination path.
        #[arg(long, short)]
        out: PathBuf,
    },

    /// Delete one or more stored images.
    Delete {
        /// Stored file names.
        #[arg(required = true)]
        file_names: Vec<String>,
    },

    /// Remove every expired image once.
    Expire,

    /// Keep removing expired images until interrupted.
    Watch,
}

/// Either `--for N --unit U` or `--until DATE`.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = true)]
pub struct ExpiryArgs {
    /// Keep the image for this many units.
    #[arg(long = "for", value_name = "N", requires = "unit", conflicts_with = "until")]
    pub amount: Option<u32>,

    /// Unit for `--for`: minutes, hours, days, months or years.
    #[arg(long, requires = "amount")]
    pub unit: Option<String>,

    /// Keep the image until this instant (UTC), e.g. `2026-12-31 18:00`.
    #[arg(long)]
    pub until: Option<String>,
}

impl ExpiryArgs {
    /// Convert parsed flags into a store request.
    pub fn to_request(&self) -> StoreResult<ExpiryRequest> {
        match (&self.amount, &self.unit, &self.until) {
            (_, _, Some(until)) => ExpiryRequest::parse_until(until),
            (Some(amount), Some(unit), None) => Ok(ExpiryRequest::For {
                amount: *amount,
                unit: unit.parse::<TimeUnit>()?,
            }),
            _ => Err(snapshot_store::StoreError::InvalidArgument(
                "use either --for N --unit U or --until DATE".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn save_for_parses_into_relative_request() {
        let cli = Cli::try_parse_from([
            "snapshot", "save", "cat.jpg", "--for", "3", "--unit", "days",
        ])
        .unwrap();
        let Commands::Save { path, expiry } = cli.command else {
            panic!("expected save");
        };
        assert_eq!(path, PathBuf::from("cat.jpg"));
        assert_eq!(
            expiry.to_request().unwrap(),
            ExpiryRequest::For {
                amount: 3,
                unit: TimeUnit::Days
            }
        );
    }

    #[test]
    fn save_until_parses_into_absolute_request() {
        let cli = Cli::try_parse_from([
            "snapshot", "save", "cat.jpg", "--until", "2026-12-31 18:00",
        ])
        .unwrap();
        let Commands::Save { expiry, .. } = cli.command else {
            panic!("expected save");
        };
        assert!(matches!(
            expiry.to_request().unwrap(),
            ExpiryRequest::Until(_)
        ));
    }

    #[test]
    fn save_requires_an_expiry() {
        assert!(Cli::try_parse_from(["snapshot", "save", "cat.jpg"]).is_err());
        assert!(
            Cli::try_parse_from(["snapshot", "save", "cat.jpg", "--for", "3"]).is_err()
        );
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli =
            Cli::try_parse_from(["snapshot", "list", "--json", "--data-dir", "/tmp/snap"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/snap")));
        assert!(matches!(cli.command, Commands::List { json: true }));
    }

    #[test]
    fn bad_unit_is_reported() {
        let cli = Cli::try_parse_from([
            "snapshot", "save", "cat.jpg", "--for", "3", "--unit", "weeks",
        ])
        .unwrap();
        let Commands::Save { expiry, .. } = cli.command else {
            panic!("expected save");
        };
        assert!(expiry.to_request().is_err());
    }
}
