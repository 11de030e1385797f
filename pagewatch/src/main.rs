use commands::command_argument_builder;
use pagewatch::handlers::{
    handle_init, handle_run, handle_seeds_import, handle_seeds_list, handle_status,
};
use tracing::Level;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    let max_level = if quiet { Level::WARN } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();

    match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("seeds", primary_command)) => match primary_command.subcommand() {
            Some(("import", secondary_command)) => handle_seeds_import(secondary_command),
            Some(("list", secondary_command)) => handle_seeds_list(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("run", primary_command)) => handle_run(primary_command, quiet).await,
        Some(("status", primary_command)) => handle_status(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
