//! Command line parsing and config bootstrapping.

use crate::Options;
use bible_clock_lib::config::Config;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tempfile::tempdir;

fn parse(args: &[&str]) -> Result<Options, clap::Error> {
    Options::try_parse_from(std::iter::once("bible-clock").chain(args.iter().copied()))
}

#[test]
fn command_definition_is_consistent() {
    Options::command().debug_assert();
}

#[test]
fn no_arguments_selects_defaults() {
    let options = parse(&[]).unwrap();
    assert!(!options.stdout);
    assert!(!options.init_config);
    assert_eq!(options.config_path, "bible-clock.toml");
}

#[test]
fn flags_are_recognised_in_any_order() {
    let options = parse(&["--config", "/etc/clock.toml", "--stdout"]).unwrap();
    assert!(options.stdout);
    assert!(!options.init_config);
    assert_eq!(options.config_path, "/etc/clock.toml");

    let options = parse(&["--init-config", "--config=/tmp/clock.toml"]).unwrap();
    assert!(options.init_config);
    assert_eq!(options.config_path, "/tmp/clock.toml");
}

#[test]
fn config_without_path_is_rejected() {
    let err = parse(&["--config"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn unknown_argument_is_rejected_with_usage() {
    let err = parse(&["--fullscreen"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    let message = err.to_string();
    assert!(message.contains("--fullscreen"));
    assert!(message.contains("Usage: bible-clock"));
}

#[test]
fn help_is_handled_by_the_parser() {
    let err = parse(&["--help"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    assert!(err.to_string().contains("--init-config"));
}

/// `--init-config` writes a file that loads back to the defaults.
#[test]
fn written_default_config_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bible-clock.toml");
    Config::default().save(&path).unwrap();
    assert_eq!(Config::load_from_path(&path), Config::default());
}
