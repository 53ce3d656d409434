use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ldp_index::SortOrder;
use ldp_types::{ContainerType, MemberType};

#[derive(Parser)]
#[command(
    name = "ldpc",
    about = "LDP container store: hierarchical containers with indexed membership",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository configuration file
    #[arg(short, long, global = true, default_value = "ldp.toml")]
    pub config: PathBuf,

    /// Debug logging, and print committed events
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Give up after this many milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SortArg {
    Insertion,
    Newest,
    Id,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Insertion => SortOrder::Insertion,
            SortArg::Newest => SortOrder::NewestFirst,
            SortArg::Id => SortOrder::MemberId,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum MemberTypeArg {
    Resource,
    Container,
    Binary,
}

impl From<MemberTypeArg> for MemberType {
    fn from(arg: MemberTypeArg) -> Self {
        match arg {
            MemberTypeArg::Resource => MemberType::Resource,
            MemberTypeArg::Container => MemberType::Container,
            MemberTypeArg::Binary => MemberType::Binary,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a repository configuration file
    Init(InitArgs),
    /// Create a container
    Create(CreateArgs),
    /// Show a container
    Show(IdArgs),
    /// Delete an empty container
    Delete(IdArgs),
    /// Set or remove container metadata
    Meta(MetaArgs),
    /// Add a member to a container
    Add(MemberArgs),
    /// Remove a member from a container
    Rm(MemberArgs),
    /// List a container's members
    Ls(LsArgs),
    /// List child containers
    Children(IdArgs),
    /// Print the root-to-container path
    Path(IdArgs),
    /// Resolve a slash-delimited container path
    Find(FindArgs),
    /// Move a container under a new parent
    Mv(MvArgs),
    /// Rebuild the membership index from the primary store
    Rebuild(RebuildArgs),
    /// Compare the membership index against the primary store
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Directory holding repository data
    #[arg(long, default_value = "./ldp-data")]
    pub data_dir: PathBuf,
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Container id; generated when omitted
    pub id: Option<String>,
    #[arg(short, long, default_value = "")]
    pub parent: String,
    #[arg(short = 't', long = "type", default_value = "basic", value_parser = parse_container_type)]
    pub container_type: ContainerType,
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct MemberArgs {
    pub container: String,
    #[arg(required = true)]
    pub members: Vec<String>,
}

#[derive(Args)]
pub struct MetaArgs {
    pub id: String,
    /// `key=value` pairs to set
    #[arg(long = "set", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,
    /// Keys to remove
    #[arg(long = "unset")]
    pub unset: Vec<String>,
}

#[derive(Args)]
pub struct LsArgs {
    pub container: String,
    #[arg(long, default_value = "0")]
    pub offset: u64,
    #[arg(short = 'n', long)]
    pub limit: Option<u64>,
    #[arg(long, default_value = "insertion")]
    pub sort: SortArg,
    #[arg(short = 't', long = "type")]
    pub member_type: Option<MemberTypeArg>,
    /// Stream every member in batches instead of one page
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct FindArgs {
    pub path: String,
}

#[derive(Args)]
pub struct MvArgs {
    pub id: String,
    /// New parent; omit with --root
    pub parent: Option<String>,
    /// Make the container a root
    #[arg(long, conflicts_with = "parent")]
    pub root: bool,
}

#[derive(Args)]
pub struct RebuildArgs {
    /// Rebuild one container; all when omitted
    pub id: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Rebuild divergent partitions after reporting them
    #[arg(long)]
    pub repair: bool,
}

fn parse_container_type(s: &str) -> Result<ContainerType, String> {
    s.parse::<ContainerType>().map_err(|e| e.to_string())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}
