use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use serde_json::json;

use depot_refs::names::REFS_PREFIX;
use depot_repository::{FileRepository, Metadata, RepositoryConfig};
use depot_store::{EntryMode, ObjectKind, Tree, TreeEntry};
use depot_types::{ObjectId, TagPath};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let open = || {
        FileRepository::open(&cli.repo)
            .with_context(|| format!("cannot open repository at {}", cli.repo.display()))
    };
    match cli.command {
        Command::Init => cmd_init(&cli.repo),
        Command::Add(args) => cmd_add(&open()?, args),
        Command::Tag(args) => cmd_tag(&open()?, args),
        Command::Untag(args) => cmd_untag(&open()?, args),
        Command::Cp(args) => cmd_cp(&open()?, args),
        Command::Tags(args) => cmd_tags(&open()?, args, format),
        Command::Show(args) => cmd_show(&open()?, args, format),
        Command::Validate(args) => cmd_validate(&open()?, args),
        Command::Log(args) => cmd_log(&open()?, args, format),
        Command::Cat(args) => cmd_cat(&open()?, args),
        Command::Refs(args) => cmd_refs(&open()?, args, format),
    }
}

fn cmd_init(path: &Path) -> anyhow::Result<()> {
    let repo = FileRepository::init(path, RepositoryConfig::default())
        .with_context(|| format!("cannot initialize {}", path.display()))?;
    println!(
        "{} Initialized Depot repository in {}",
        "✓".green().bold(),
        repo.path().display().to_string().bold()
    );
    println!("  Root ref: {}", repo.config().root_ref.cyan());
    Ok(())
}

fn cmd_add(repo: &FileRepository, args: AddArgs) -> anyhow::Result<()> {
    let (id, mode) = store_path(repo, &args.path)
        .with_context(|| format!("cannot store {}", args.path.display()))?;
    tracing::debug!(path = %args.path.display(), %mode, "stored");
    println!("{id}");
    Ok(())
}

fn cmd_tag(repo: &FileRepository, args: TagArgs) -> anyhow::Result<()> {
    let name = TagPath::parse(&args.name)?;
    let id = parse_id(&args.id)?;
    let metadata: Metadata = args.meta.into_iter().collect();
    repo.put_tag(&name, &id, &args.message, &metadata)?;
    println!(
        "{} Tagged {} → {} (snapshot {})",
        "✓".green().bold(),
        name.to_string().yellow(),
        id.short_hex().cyan(),
        repo.sequence()
    );
    Ok(())
}

fn cmd_untag(repo: &FileRepository, args: UntagArgs) -> anyhow::Result<()> {
    let name = TagPath::parse(&args.name)?;
    if !repo.tag_map().contains(&name) {
        println!("Tag {} does not exist.", name.to_string().yellow());
        return Ok(());
    }
    let metadata: Metadata = args.meta.into_iter().collect();
    repo.remove_tag(&name, &args.message, &metadata)?;
    println!(
        "{} Removed tag {} (snapshot {})",
        "✓".green().bold(),
        name.to_string().yellow(),
        repo.sequence()
    );
    Ok(())
}

fn cmd_cp(repo: &FileRepository, args: CpArgs) -> anyhow::Result<()> {
    let src = TagPath::parse(&args.src)?;
    let dst = TagPath::parse(&args.dst)?;
    let metadata: Metadata = args.meta.into_iter().collect();
    repo.copy_tag(&src, &dst, &args.message, &metadata)?;
    println!(
        "{} Copied {} → {} (snapshot {})",
        "✓".green().bold(),
        src.to_string().yellow(),
        dst.to_string().yellow(),
        repo.sequence()
    );
    Ok(())
}

fn cmd_tags(repo: &FileRepository, args: TagsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let prefix = match args.prefix {
        Some(p) => TagPath::parse(&p)?,
        None => TagPath::root(),
    };
    let map = repo.tag_map();

    if format == OutputFormat::Json {
        let tags: serde_json::Map<String, serde_json::Value> = map
            .under(&prefix)
            .map(|(name, entry)| (name.to_string(), json!(entry.content_id())))
            .collect();
        let out = json!({
            "sequence": map.sequence(),
            "commit": map.commit(),
            "tags": tags,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut count = 0;
    for (name, entry) in map.under(&prefix) {
        count += 1;
        println!(
            "{}  {}  {}",
            entry.content_id().short_hex().cyan(),
            name.to_string().yellow(),
            entry.message().unwrap_or_default().dimmed()
        );
    }
    if count == 0 {
        println!("No tags.");
    }
    Ok(())
}

fn cmd_show(repo: &FileRepository, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let name = TagPath::parse(&args.name)?;
    let map = repo.tag_map();
    let entry = map
        .get(&name)
        .ok_or_else(|| anyhow!("no tag named {name}"))?;

    if format == OutputFormat::Json {
        let out = json!({
            "tag": name,
            "content": entry.content_id(),
            "entry": entry.id(),
            "parent": entry.parent_id(),
            "attributes": entry.attributes(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Tag {}", name.to_string().yellow().bold());
    println!("  Content: {}", entry.content_id().to_string().cyan());
    println!("  Entry:   {}", entry.id());
    if let Some(parent) = entry.parent_id() {
        println!("  Replaces: {}", parent.to_string().dimmed());
    }
    for (key, value) in entry.attributes() {
        println!("  {key}: {value}");
    }
    Ok(())
}

fn cmd_validate(repo: &FileRepository, args: ValidateArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    if !repo.validate_hash(&id)? {
        bail!("{id} is incomplete: some reachable objects are missing");
    }
    println!("{} {} is complete", "✓".green().bold(), id.short_hex().cyan());
    Ok(())
}

fn cmd_log(repo: &FileRepository, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let history = repo.history(args.limit)?;

    if format == OutputFormat::Json {
        let out: Vec<_> = history
            .iter()
            .map(|s| {
                json!({
                    "commit": s.commit,
                    "sequence": s.sequence,
                    "message": s.message,
                    "attributes": s.attributes,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No snapshots.");
    }
    for snapshot in &history {
        println!(
            "{}  {}  {}",
            format!("#{}", snapshot.sequence).yellow().bold(),
            snapshot.commit.short_hex().dimmed(),
            snapshot.message.as_deref().unwrap_or_default()
        );
        for (key, value) in &snapshot.attributes {
            println!("    {key}: {value}");
        }
    }
    Ok(())
}

fn cmd_cat(repo: &FileRepository, args: CatArgs) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    match repo.object_kind(&id)? {
        None => bail!("object {id} not found"),
        Some(ObjectKind::Blob) => {
            let mut reader = repo.open_blob(&id)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut reader, &mut stdout)?;
            stdout.flush()?;
        }
        Some(ObjectKind::Tree) => {
            for entry in repo.read_tree(&id)?.iter() {
                println!("{} {}\t{}", entry.mode, entry.object_id, entry.name);
            }
        }
        Some(ObjectKind::Commit) => {
            let commit = repo.read_commit(&id)?;
            println!("tree {}", commit.tree);
            if let Some(parent) = commit.parent {
                println!("parent {parent}");
            }
            for (key, value) in &commit.attributes {
                println!("{key} {value}");
            }
            if let Some(message) = &commit.message {
                println!("\n{message}");
            }
        }
    }
    Ok(())
}

fn cmd_refs(repo: &FileRepository, args: RefsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root_ref = &repo.config().root_ref;
    if let Some(name) = args.delete {
        if &name == root_ref {
            bail!("{name} is this repository's root ref");
        }
        if repo.refs().delete_ref(&name)? {
            println!("{} Deleted ref {}", "✓".green().bold(), name.cyan());
        } else {
            println!("Ref {} does not exist.", name.cyan());
        }
        return Ok(());
    }

    let refs = repo.refs().list_refs(REFS_PREFIX)?;
    if format == OutputFormat::Json {
        let out: Vec<_> = refs
            .iter()
            .map(|(name, target)| json!({ "name": name, "target": target, "root": name == root_ref }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if refs.is_empty() {
        println!("No refs.");
    }
    for (name, target) in &refs {
        let marker = if name == root_ref { "*" } else { " " };
        println!("{marker} {}  {}", target.short_hex().dimmed(), name.cyan());
    }
    Ok(())
}

fn parse_id(raw: &str) -> anyhow::Result<ObjectId> {
    raw.parse::<ObjectId>()
        .with_context(|| format!("{raw:?} is not an object id"))
}

/// Store a file as a blob or a directory as a tree, recursively.
fn store_path(repo: &FileRepository, path: &Path) -> anyhow::Result<(ObjectId, EntryMode)> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|name| anyhow!("file name {name:?} is not UTF-8"))?;
            let (id, mode) = store_path(repo, &entry.path())?;
            entries.push(TreeEntry::new(mode, name, id));
        }
        Ok((repo.add_tree(&Tree::new(entries))?, EntryMode::Directory))
    } else if meta.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        let id = repo.add_blob(target.to_string_lossy().as_bytes())?;
        Ok((id, EntryMode::Symlink))
    } else {
        let data = fs::read(path)?;
        Ok((repo.add_blob(&data)?, file_mode(&meta)))
    }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> EntryMode {
    use std::os::unix::fs::PermissionsExt;
    if meta.permissions().mode() & 0o111 != 0 {
        EntryMode::Executable
    } else {
        EntryMode::Regular
    }
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> EntryMode {
    EntryMode::Regular
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_directories_as_trees() {
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join("app/WEB-INF")).unwrap();
        fs::write(work.path().join("app/index.html"), "<html/>").unwrap();
        fs::write(work.path().join("app/WEB-INF/web.xml"), "<web/>").unwrap();

        let repo_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::open(repo_dir.path()).unwrap();
        let (id, mode) = store_path(&repo, &work.path().join("app")).unwrap();
        assert_eq!(mode, EntryMode::Directory);

        let tree = repo.read_tree(&id).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("WEB-INF").unwrap().mode, EntryMode::Directory);
        let index = tree.get("index.html").unwrap();
        assert_eq!(repo.read_blob(&index.object_id).unwrap(), b"<html/>");
        assert!(repo.validate_hash(&id).unwrap());
    }

    #[test]
    fn tag_then_untag_through_commands() {
        let repo_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::init(repo_dir.path(), RepositoryConfig::default()).unwrap();
        let id = repo.add_blob(b"war").unwrap();

        cmd_tag(
            &repo,
            TagArgs {
                name: "webapps/foo".into(),
                id: id.to_hex(),
                message: "deploy".into(),
                meta: vec![("user".into(), "ops".into())],
            },
        )
        .unwrap();
        let entry = repo.tag_map().get(&TagPath::parse("webapps/foo").unwrap()).cloned().unwrap();
        assert_eq!(entry.content_id(), id);
        assert_eq!(entry.attribute("user"), Some("ops"));

        cmd_untag(
            &repo,
            UntagArgs {
                name: "webapps/foo".into(),
                message: String::new(),
                meta: Vec::new(),
            },
        )
        .unwrap();
        assert!(repo.tag_map().is_empty());
        assert_eq!(repo.sequence(), 2);
    }

    #[test]
    fn copy_then_manage_refs() {
        let repo_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::init(repo_dir.path(), RepositoryConfig::default()).unwrap();
        let id = repo.add_blob(b"war").unwrap();
        repo.put_tag(&TagPath::parse("webapps/foo").unwrap(), &id, "", &Metadata::new())
            .unwrap();

        cmd_cp(
            &repo,
            CpArgs {
                src: "webapps/foo".into(),
                dst: "webapps/bar".into(),
                message: "promote".into(),
                meta: Vec::new(),
            },
        )
        .unwrap();
        assert_eq!(repo.tag_content_id(&TagPath::parse("webapps/bar").unwrap()), Some(id));
        assert!(cmd_cp(
            &repo,
            CpArgs {
                src: "webapps/nope".into(),
                dst: "webapps/baz".into(),
                message: String::new(),
                meta: Vec::new(),
            },
        )
        .is_err());

        repo.refs().write_ref("refs/old/root", &id).unwrap();
        assert_eq!(repo.refs().list_refs(REFS_PREFIX).unwrap().len(), 2);
        assert!(cmd_refs(
            &repo,
            RefsArgs {
                delete: Some(repo.config().root_ref.clone()),
            },
            OutputFormat::Text,
        )
        .is_err());
        cmd_refs(
            &repo,
            RefsArgs {
                delete: Some("refs/old/root".into()),
            },
            OutputFormat::Text,
        )
        .unwrap();
        let left = repo.refs().list_refs(REFS_PREFIX).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, repo.config().root_ref);
        cmd_refs(&repo, RefsArgs { delete: None }, OutputFormat::Json).unwrap();
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(parse_id("xyz").is_err());
        assert!(parse_id(&"ab".repeat(32)).is_ok());
    }
}
