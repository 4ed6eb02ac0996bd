use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "Depot — versioned deployment tags over content-addressed storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory
    #[arg(long, global = true, env = "DEPOT_REPO", default_value = ".depot")]
    pub repo: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a repository and write its default configuration
    Init,
    /// Store a file or directory and print its object id
    Add(AddArgs),
    /// Point a tag at stored content
    Tag(TagArgs),
    /// Remove a tag
    Untag(UntagArgs),
    /// Point a tag at the content another tag names
    Cp(CpArgs),
    /// List tags, optionally below a prefix
    Tags(TagsArgs),
    /// Show one tag entry
    Show(ShowArgs),
    /// Check that every object reachable from an id is stored
    Validate(ValidateArgs),
    /// Show snapshot history, newest first
    Log(LogArgs),
    /// Print a stored object
    Cat(CatArgs),
    /// List refs, or delete one left behind by an earlier root_ref
    Refs(RefsArgs),
}

#[derive(Args)]
pub struct AddArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct TagArgs {
    pub name: String,
    pub id: String,
    #[arg(short, long, default_value = "")]
    pub message: String,
    /// Extra attribute recorded with the change, as KEY=VALUE
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args)]
pub struct UntagArgs {
    pub name: String,
    #[arg(short, long, default_value = "")]
    pub message: String,
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args)]
pub struct CpArgs {
    pub src: String,
    pub dst: String,
    #[arg(short, long, default_value = "")]
    pub message: String,
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args)]
pub struct TagsArgs {
    pub prefix: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub name: String,
}

#[derive(Args)]
pub struct ValidateArgs {
    pub id: String,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct CatArgs {
    pub id: String,
}

#[derive(Args)]
pub struct RefsArgs {
    /// Delete this ref instead of listing
    #[arg(long, value_name = "REF")]
    pub delete: Option<String>,
}

pub fn parse_meta(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err("metadata key is empty".into());
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_tag_with_metadata() {
        let cli = Cli::try_parse_from([
            "depot", "--repo", "/tmp/r", "tag", "webapps/foo", "abcd", "-m", "deploy", "--meta",
            "user=ops", "--meta", "ticket=OPS-1=2",
        ])
        .unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/r"));
        let Command::Tag(args) = cli.command else {
            panic!("expected tag command");
        };
        assert_eq!(args.name, "webapps/foo");
        assert_eq!(args.message, "deploy");
        assert_eq!(
            args.meta,
            [
                ("user".to_string(), "ops".to_string()),
                ("ticket".to_string(), "OPS-1=2".to_string())
            ]
        );
    }

    #[test]
    fn meta_requires_key_and_separator() {
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=v").is_err());
        assert_eq!(parse_meta("k=").unwrap(), ("k".into(), String::new()));
    }

    #[test]
    fn parses_copy_and_refs() {
        let cli = Cli::try_parse_from(["depot", "cp", "webapps/foo", "webapps/bar", "-m", "promote"])
            .unwrap();
        let Command::Cp(args) = cli.command else {
            panic!("expected cp command");
        };
        assert_eq!((args.src.as_str(), args.dst.as_str()), ("webapps/foo", "webapps/bar"));
        assert_eq!(args.message, "promote");

        let cli = Cli::try_parse_from(["depot", "refs", "--delete", "refs/old/root"]).unwrap();
        let Command::Refs(args) = cli.command else {
            panic!("expected refs command");
        };
        assert_eq!(args.delete.as_deref(), Some("refs/old/root"));
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::try_parse_from(["depot", "-vv", "tags"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.format, OutputFormat::Text);
    }
}
