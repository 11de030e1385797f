use crate::CLAP_STYLING;
use clap::{Arg, arg, command};
use url::Url;

const DEFAULT_DATA_DIR: &str = "~/.config/pagewatch/";

fn data_dir_arg() -> Arg {
    arg!(-d --"data-dir" <PATH>)
        .required(false)
        .help("Directory holding the seed book and snapshot log")
        .default_value(DEFAULT_DATA_DIR)
}

fn source_arg() -> Arg {
    arg!(-s --"source" <SOURCE_ID>)
        .required(true)
        .help("The seed source to work with")
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("pagewatch")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("pagewatch")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only log warnings and skip progress output")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Initializes the pagewatch seed book and snapshot log on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store pagewatch data")
                        .default_value(DEFAULT_DATA_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing seed book and snapshot log at \
                        the specified location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("seeds")
                .about("Manage the seed URLs to monitor")
                .subcommand_required(true)
                .subcommand(
                    command!("import")
                        .about(
                            "Imports a CSV sheet of seed URLs. The first column is the URL, up to \
                        four more columns are kept as metadata.",
                        )
                        .arg(data_dir_arg())
                        .arg(source_arg())
                        .arg(
                            arg!(--"sheet" <INDEX>)
                                .required(true)
                                .help("Sheet index to import into; an existing sheet is replaced")
                                .value_parser(clap::value_parser!(usize)),
                        )
                        .arg(
                            arg!(-F --"file" <PATH>)
                                .required(true)
                                .help("CSV file with a header row")
                                .value_parser(clap::value_parser!(std::path::PathBuf)),
                        ),
                )
                .subcommand(
                    command!("list")
                        .about("Lists seed rows and when they were last checked")
                        .arg(data_dir_arg())
                        .arg(source_arg())
                        .arg(
                            arg!(--"sheet" <INDEX>)
                                .required(false)
                                .help("Only list this sheet")
                                .value_parser(clap::value_parser!(usize)),
                        ),
                ),
        )
        .subcommand(
            command!("run")
                .about(
                    "Checks every seed in a range of sheets, and the same-host links of every \
                seed page, for changes since the last run.",
                )
                .arg(data_dir_arg())
                .arg(source_arg())
                .arg(
                    arg!(--"start" <INDEX>)
                        .required(false)
                        .help("First sheet index to process")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    arg!(--"end" <INDEX>)
                        .required(true)
                        .help("Sheet index to stop before (exclusive)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-t --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async workers checking seeds in parallel.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    arg!(--"cooldown" <SECONDS>)
                        .required(false)
                        .help("Pause each worker takes between two seeds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"fetch-timeout" <SECONDS>)
                        .required(false)
                        .help("Timeout for downloading a PDF document")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"render-timeout" <SECONDS>)
                        .required(false)
                        .help("Timeout for loading a single page")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"fan-out" <NUM_LINKS>)
                        .required(false)
                        .help("Maximum number of same-host links followed per seed page")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("31"),
                )
                .arg(
                    arg!(-r --"recipient" <ADDRESS>)
                        .required(false)
                        .help("Change alert recipient; repeat for several")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"webhook" <URL>)
                        .required(false)
                        .help("Relay endpoint that receives change alerts as JSON (default: log only)")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("status")
                .about("Shows what the snapshot log currently holds")
                .arg(data_dir_arg())
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("Show the stored fingerprint of one URL"),
                ),
        )
}
