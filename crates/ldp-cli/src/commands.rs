use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use ldp_container::{Container, ContainerEvent};
use ldp_index::IndexEntry;
use ldp_repository::{
    drain_cursor, open_repository_with, BroadcastDispatcher, ContainerRepository, Context,
    EventFilter, EventStream, ListOptions, MetadataUpdate, RepositoryConfig, StoreRepository,
};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    if let Command::Init(args) = &cli.command {
        return cmd_init(&cli.config, args);
    }

    let config = RepositoryConfig::load(&cli.config)
        .with_context(|| format!("no usable configuration at {} (run `ldpc init`)", cli.config.display()))?;
    debug!(config = %cli.config.display(), data_dir = %config.data_dir.display(), "configuration loaded");
    let dispatcher = Arc::new(BroadcastDispatcher::new(config.event_channel_capacity));
    let events = cli.verbose.then(|| dispatcher.subscribe(EventFilter::default()));
    let repo = open_repository_with(&config, dispatcher)?;

    let ctx = match cli.timeout_ms {
        Some(ms) => Context::with_timeout(Duration::from_millis(ms)),
        None => Context::background(),
    };
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let out = Output {
        json: matches!(cli.format, OutputFormat::Json),
    };
    let result = match cli.command {
        Command::Init(_) => Ok(()),
        Command::Create(args) => cmd_create(&repo, &ctx, out, args).await,
        Command::Show(args) => cmd_show(&repo, &ctx, out, args).await,
        Command::Delete(args) => {
            repo.delete_container(&ctx, &args.id).await?;
            out.done(format!("Deleted container {}", args.id.yellow()));
            Ok(())
        }
        Command::Meta(args) => cmd_meta(&repo, &ctx, out, args).await,
        Command::Add(args) => cmd_add(&repo, &ctx, out, args).await,
        Command::Rm(args) => cmd_rm(&repo, &ctx, out, args).await,
        Command::Ls(args) => cmd_ls(&repo, &ctx, out, args).await,
        Command::Children(args) => {
            let children = repo.get_children(&ctx, &args.id).await?;
            out.containers(&children);
            Ok(())
        }
        Command::Path(args) => {
            let path = repo.get_path(&ctx, &args.id).await?;
            out.path(&path);
            Ok(())
        }
        Command::Find(args) => {
            let found = repo.find_by_path(&ctx, &args.path).await?;
            out.container(&found);
            Ok(())
        }
        Command::Mv(args) => cmd_mv(&repo, &ctx, out, args).await,
        Command::Rebuild(args) => cmd_rebuild(&repo, &ctx, out, args).await,
        Command::Verify(args) => cmd_verify(&repo, &ctx, out, args).await,
    };

    if let Some(events) = events {
        print_events(events);
    }
    result
}

fn cmd_init(config_path: &Path, args: &InitArgs) -> anyhow::Result<()> {
    if config_path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", config_path.display());
    }
    let config = RepositoryConfig {
        data_dir: args.data_dir.clone(),
        ..RepositoryConfig::default()
    };
    std::fs::write(config_path, config.to_toml()?)
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("{} Wrote {}", "✓".green().bold(), config_path.display().to_string().bold());
    println!("  Data: {}", config.data_dir.display().to_string().cyan());
    Ok(())
}

async fn cmd_create(repo: &StoreRepository, ctx: &Context, out: Output, args: CreateArgs) -> anyhow::Result<()> {
    let id = args.id.unwrap_or_default();
    let mut container = repo.new_container(&id, &args.parent, args.container_type)?;
    if let Some(title) = args.title {
        container.set_title(title, container.created_at());
    }
    let created = repo.create_container(ctx, container).await?;
    if out.json {
        out.container(&created);
    } else {
        let parent = if created.is_root() { "(root)".dimmed().to_string() } else { created.parent_id().to_string() };
        out.done(format!(
            "Created {} container {} under {}",
            created.container_type(),
            created.id().yellow(),
            parent
        ));
    }
    Ok(())
}

async fn cmd_show(repo: &StoreRepository, ctx: &Context, out: Output, args: IdArgs) -> anyhow::Result<()> {
    let container = repo.get_container(ctx, &args.id).await?;
    out.container(&container);
    Ok(())
}

async fn cmd_meta(repo: &StoreRepository, ctx: &Context, out: Output, args: MetaArgs) -> anyhow::Result<()> {
    let mut update = MetadataUpdate::new();
    for (key, value) in args.set {
        update = update.set(key, value);
    }
    for key in args.unset {
        update = update.remove(key);
    }
    if update.is_empty() {
        bail!("nothing to change: pass --set key=value or --unset key");
    }
    let updated = repo.update_metadata(ctx, &args.id, update).await?;
    out.container(&updated);
    Ok(())
}

async fn cmd_add(repo: &StoreRepository, ctx: &Context, out: Output, args: MemberArgs) -> anyhow::Result<()> {
    for member_id in &args.members {
        let member = repo.add_member(ctx, &args.container, member_id).await?;
        out.done(format!(
            "Added {} {} to {}",
            member.member_type,
            member.id.yellow(),
            args.container.bold()
        ));
    }
    Ok(())
}

async fn cmd_rm(repo: &StoreRepository, ctx: &Context, out: Output, args: MemberArgs) -> anyhow::Result<()> {
    for member_id in &args.members {
        let member = repo.remove_member(ctx, &args.container, member_id).await?;
        out.done(format!("Removed {} from {}", member.id.yellow(), args.container.bold()));
    }
    Ok(())
}

async fn cmd_ls(repo: &StoreRepository, ctx: &Context, out: Output, args: LsArgs) -> anyhow::Result<()> {
    let mut options = ListOptions::new().sorted(args.sort.into());
    options.offset = args.offset;
    options.limit = args.limit;
    if let Some(member_type) = args.member_type {
        options = options.of_type(member_type.into());
    }

    if args.all {
        let entries = drain_cursor(ctx, repo.member_cursor(&args.container, options, 0)).await?;
        if out.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else {
            entries.iter().for_each(print_entry);
            println!("{}", format!("{} member(s)", entries.len()).dimmed());
        }
        return Ok(());
    }

    let page = repo.list_members(ctx, &args.container, options).await?;
    if out.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    page.entries.iter().for_each(print_entry);
    if page.is_empty() {
        println!("{}", format!("no members at offset {} ({} total)", page.offset, page.total).dimmed());
    } else {
        let first = page.offset + 1;
        let last = page.offset + page.len() as u64;
        let more = if page.has_more() { ", more available" } else { "" };
        println!("{}", format!("{first}-{last} of {}{more}", page.total).dimmed());
    }
    Ok(())
}

async fn cmd_mv(repo: &StoreRepository, ctx: &Context, out: Output, args: MvArgs) -> anyhow::Result<()> {
    let parent = match (args.parent, args.root) {
        (Some(parent), false) => parent,
        (None, true) => String::new(),
        _ => bail!("give a new parent or --root"),
    };
    let moved = repo.move_container(ctx, &args.id, &parent).await?;
    let path = repo.get_path(ctx, moved.id()).await?;
    if out.json {
        println!("{}", json!({ "id": moved.id(), "parent_id": moved.parent_id(), "path": path }));
    } else {
        out.done(format!("Moved {} to /{}", moved.id().yellow(), path.join("/")));
    }
    Ok(())
}

async fn cmd_rebuild(repo: &StoreRepository, ctx: &Context, out: Output, args: RebuildArgs) -> anyhow::Result<()> {
    match args.id {
        Some(id) => {
            let rows = repo.rebuild_index(ctx, &id).await?;
            if out.json {
                println!("{}", json!({ "container": id, "rows_written": rows }));
            } else {
                out.done(format!("Rebuilt index for {} ({rows} row(s))", id.yellow()));
            }
        }
        None => {
            let summary = repo.rebuild_all(ctx).await?;
            if out.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                out.done(format!(
                    "Rebuilt {} partition(s), {} row(s); dropped {} orphan partition(s)",
                    summary.partitions_rebuilt, summary.rows_written, summary.orphans_dropped
                ));
            }
        }
    }
    Ok(())
}

async fn cmd_verify(repo: &StoreRepository, ctx: &Context, out: Output, args: VerifyArgs) -> anyhow::Result<()> {
    let report = repo.verify(ctx).await?;
    if out.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_consistent() {
        out.done(format!(
            "Index consistent: {} container(s), {} member(s)",
            report.containers_checked, report.members_checked
        ));
    } else {
        println!(
            "{} {} divergence(s) across {} container(s)",
            "✗".red().bold(),
            report.divergences.len(),
            report.divergent_containers().len()
        );
        for divergence in &report.divergences {
            println!("  {divergence}");
        }
    }

    if report.is_consistent() {
        return Ok(());
    }
    if !args.repair {
        bail!("membership index diverges from the primary store (rerun with --repair)");
    }
    let summary = repo.rebuild_all(ctx).await?;
    out.done(format!(
        "Repaired: {} partition(s) rebuilt, {} orphan(s) dropped",
        summary.partitions_rebuilt, summary.orphans_dropped
    ));
    Ok(())
}

fn print_entry(entry: &IndexEntry) {
    println!(
        "{:>6}  {:<9}  {}  {}",
        entry.seq.to_string().dimmed(),
        entry.member_type.to_string(),
        entry.inserted_at.to_rfc3339().dimmed(),
        entry.member_id
    );
}

fn print_events(mut events: EventStream) {
    while let Ok(event) = events.try_recv() {
        eprintln!("{}", format_event(&event).dimmed());
    }
}

fn format_event(event: &ContainerEvent) -> String {
    match &event.member_id {
        Some(member) => format!("event {} {} member={}", event.kind, event.container_id, member),
        None => format!("event {} {}", event.kind, event.container_id),
    }
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn done(&self, message: String) {
        if !self.json {
            println!("{} {}", "✓".green().bold(), message);
        }
    }

    fn container(&self, container: &Container) {
        if self.json {
            match serde_json::to_string_pretty(&container.snapshot()) {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("{} {e}", "error:".red()),
            }
            return;
        }
        println!("{} {}", "Container".bold(), container.id().yellow().bold());
        println!("  Type: {}", container.container_type().to_string().cyan());
        let parent = if container.is_root() { "(root)" } else { container.parent_id() };
        println!("  Parent: {parent}");
        println!("  Members: {}", container.member_count());
        for (key, value) in container.metadata() {
            println!("  {key}: {value}");
        }
    }

    fn containers(&self, containers: &[Container]) {
        if self.json {
            let snapshots: Vec<_> = containers.iter().map(Container::snapshot).collect();
            match serde_json::to_string_pretty(&snapshots) {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("{} {e}", "error:".red()),
            }
            return;
        }
        if containers.is_empty() {
            println!("{}", "no child containers".dimmed());
        }
        for c in containers {
            println!("{}  {}  {}", c.id().yellow(), c.container_type(), format!("{} member(s)", c.member_count()).dimmed());
        }
    }

    fn path(&self, path: &[String]) {
        if self.json {
            println!("{}", json!(path));
        } else {
            println!("/{}", path.join("/"));
        }
    }
}
