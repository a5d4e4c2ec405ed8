//! Cadastra 命令行程序
//! 批量导入测量点、查看审计记录、重放校验和回滚编辑日志

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cadastra_core::prelude::*;

#[derive(Parser)]
#[command(name = "cadastra")]
#[command(about = "Cadastral edit journal tool")]
struct Cli {
    /// Settings file (JSON); built-in defaults are used when omitted
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a point file into a journal, creating the journal if needed
    Import {
        /// Journal file
        journal: PathBuf,
        /// Point file, one `x,y` or `key,x,y` per line
        points: PathBuf,
        /// Entity type of the imported points
        #[arg(long, default_value_t = 1)]
        entity: u32,
        /// Join consecutive points with lines of this entity type
        #[arg(long)]
        line_entity: Option<u32>,
    },
    /// List the edits recorded in a journal
    List { journal: PathBuf },
    /// Replay a journal and report the resulting model
    Verify { journal: PathBuf },
    /// Remove the last edit of the journal's last session
    Rollback { journal: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let settings = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(settings)
}

/// 重放已有日志；日志不存在时返回空模型
fn open_model(journal: &Path, settings: Settings) -> Result<Model> {
    if !journal.exists() {
        info!("Starting new journal {}", journal.display());
        return Ok(Model::new(settings));
    }
    let user = settings.user.clone();
    let mut model = cadastra_file::load(journal)?.replay(settings)?;
    model.start_session(user);
    Ok(model)
}

/// 解析点文件；`#` 开头的行为注释
fn read_points(path: &Path) -> Result<Vec<ImportPoint>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut points = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = line.split(',').count();
        let point = match fields {
            2 => ImportPoint {
                key: None,
                position: InputParser::parse_point(line)?,
            },
            3 => {
                let (key, rest) = line.split_once(',').unwrap_or_default();
                let key = key
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("line {}: invalid key \"{}\"", n + 1, key.trim()))?;
                ImportPoint {
                    key: Some(key),
                    position: InputParser::parse_point(rest)?,
                }
            }
            _ => bail!("line {}: expected x,y or key,x,y", n + 1),
        };
        points.push(point);
    }
    Ok(points)
}

fn import(settings: Settings, journal: &Path, points: &Path, entity: u32, line_entity: Option<u32>) -> Result<()> {
    let mut model = open_model(journal, settings)?;
    let points_in = read_points(points)?;
    if points_in.is_empty() {
        bail!("{} contains no points", points.display());
    }
    let lines = match line_entity {
        Some(_) => (1..points_in.len())
            .map(|i| ImportLine { start: i - 1, end: i })
            .collect(),
        None => Vec::new(),
    };

    let data = EditData::Import(ImportData {
        source: points.display().to_string(),
        points: points_in,
        lines,
        point_entity: EntityTypeId(entity),
        line_entity: line_entity.map(EntityTypeId),
    });
    let mut report = |done: usize, total: usize| {
        if done % 500 == 0 || done == total {
            info!("Imported {}/{}", done, total);
        }
    };
    let executed = model.execute_with_progress(data, None, &mut report)?;
    let created = model.record(executed.sequence).map_or(0, |r| r.created.len());
    println!("Edit {} created {} feature(s)", executed.sequence, created);

    cadastra_file::save(&model, journal)?;
    Ok(())
}

fn list(settings: Settings, journal: &Path) -> Result<()> {
    let model = cadastra_file::load(journal)?.replay(settings)?;
    for session in model.sessions() {
        println!("Session {} ({}, {})", session.id, session.user, session.started.format("%Y-%m-%d %H:%M"));
        for record in session.records() {
            println!("{}", record.describe());
        }
    }
    Ok(())
}

fn verify(settings: Settings, journal: &Path) -> Result<()> {
    let model = cadastra_file::load(journal)?.replay(settings)?;
    let features = model.features();
    println!("{} edit(s) replayed", model.edit_count());
    println!(
        "{} point(s), {} line(s), {} text(s), {} inactive",
        features.count_kind(FeatureKind::Point),
        features.count_kind(FeatureKind::Line),
        features.count_kind(FeatureKind::Text),
        features.len() - features.active_count()
    );
    println!("{} identifier(s) in use", model.ids().used_count());
    Ok(())
}

fn rollback(settings: Settings, journal: &Path) -> Result<()> {
    let mut model = cadastra_file::load(journal)?.replay(settings)?;
    match model.rollback() {
        RollbackStatus::Nothing => println!("Nothing to roll back in the last session"),
        RollbackStatus::RolledBack(sequence) => {
            cadastra_file::save(&model, journal)?;
            println!("Rolled back edit {}", sequence);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let settings = load_settings(cli.settings.as_deref())?;
    match cli.command {
        Commands::Import {
            journal,
            points,
            entity,
            line_entity,
        } => import(settings, &journal, &points, entity, line_entity),
        Commands::List { journal } => list(settings, &journal),
        Commands::Verify { journal } => verify(settings, &journal),
        Commands::Rollback { journal } => rollback(settings, &journal),
    }
}
