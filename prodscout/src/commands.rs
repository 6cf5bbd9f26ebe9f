use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("prodscout")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("prodscout")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress bars and non-essential output")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            listing_args(
                command!("scrape")
                    .about("Collect every product link of a category listing and scrape each product page"),
            )
            .arg(
                arg!(-t --"threads" <NUM_WORKERS>)
                    .required(false)
                    .help("Number of product pages fetched concurrently (default: from config, 4)")
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                arg!(-o --"output" <PATH>)
                    .required(false)
                    .help("Save report to file, adding the format extension when missing (default: display to screen)")
                    .value_parser(clap::value_parser!(PathBuf)),
            )
            .arg(
                arg!(-f --"format" <FORMAT>)
                    .required(false)
                    .help("Report format: text, json, csv")
                    .value_parser(["text", "json", "csv"])
                    .default_value("text"),
            ),
        )
        .subcommand(
            listing_args(
                command!("links").about("Collect product links from a category listing and print one per line"),
            )
            .arg(
                arg!(-o --"output" <PATH>)
                    .required(false)
                    .help("Write the links to a file instead of the screen")
                    .value_parser(clap::value_parser!(PathBuf)),
            ),
        )
        .subcommand(
            command!("config")
                .about("Print the default scraper configuration as JSON, or validate a config file")
                .arg(
                    arg!(--"validate" <PATH>)
                        .required(false)
                        .help("Check a configuration file instead of printing the defaults")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
}

/// Arguments shared by every command that walks a category listing.
fn listing_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-u --"url" <URL>)
            .required(true)
            .help("Category listing URL to start from"),
    )
    .arg(
        arg!(-c --"config" <PATH>)
            .required(false)
            .help("JSON scraper configuration (see `prodscout config`)")
            .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
        arg!(--"max-pages" <NUM>)
            .required(false)
            .help("Stop after this many listing pages (default: 200)")
            .value_parser(clap::value_parser!(usize)),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Per-request timeout in seconds (default: 30)")
            .value_parser(clap::value_parser!(u64)),
    )
    .arg(
        arg!(--"retries" <ATTEMPTS>)
            .required(false)
            .help("Attempts per request, including the first (default: 3)")
            .value_parser(clap::value_parser!(u32)),
    )
    .arg(
        arg!(--"delay-ms" <RANGE>)
            .required(false)
            .help("Pause between listing pages in milliseconds, as MIN-MAX or a single value (default: 1000-2000)"),
    )
    .arg(
        arg!(--"proxy" <URL>)
            .required(false)
            .help("Send all requests through this proxy"),
    )
    .arg(
        arg!(--"no-progress")
            .required(false)
            .help("Disable progress bars")
            .action(clap::ArgAction::SetTrue),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_definition_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_scrape_arguments() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "prodscout",
                "scrape",
                "-u",
                "https://shop.test/phones/",
                "-t",
                "8",
                "--delay-ms",
                "0-250",
                "-f",
                "csv",
                "-q",
            ])
            .unwrap();

        assert!(matches.get_flag("quiet"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "scrape");
        assert_eq!(sub.get_one::<usize>("threads"), Some(&8));
        assert_eq!(sub.get_one::<String>("delay-ms").map(String::as_str), Some("0-250"));
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("csv"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = command_argument_builder().try_get_matches_from([
            "prodscout",
            "scrape",
            "-u",
            "https://shop.test/",
            "-f",
            "xlsx",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_links_requires_url() {
        let result = command_argument_builder().try_get_matches_from(["prodscout", "links"]);
        assert!(result.is_err());
    }
}
