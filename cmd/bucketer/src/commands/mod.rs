//! CLI commands module.

mod classify;
mod list;
mod show;

pub use classify::ClassifyCommand;
pub use list::ListCommand;
pub use show::ShowCommand;

use crate::Cli;
use crate::config::Config;
use crate::output::{Output, OutputFormat};

pub(crate) fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    Config::load(cli.config.as_deref())
}

pub(crate) fn output(cli: &Cli) -> Output {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Yaml
    };
    Output::new(format, cli.output.clone())
}
