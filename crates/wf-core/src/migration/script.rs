//! Migration scripts and their discovery

use crate::error::{Direction, MigrationError, MigrationResult};
use crate::migration::schema::{IndexSpec, SchemaHandle};
use crate::names::ScriptName;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use wf_db::{ColumnSpec, TypeRegistry};

/// One named, reversible unit of schema change.
///
/// Implementations registered in code sit next to file scripts; both kinds
/// are ordered together by name.
#[async_trait]
pub trait Script: Send + Sync {
    fn name(&self) -> &ScriptName;

    async fn up(&self, schema: &SchemaHandle<'_>, types: &TypeRegistry) -> MigrationResult<()>;

    async fn down(&self, schema: &SchemaHandle<'_>, types: &TypeRegistry) -> MigrationResult<()>;
}

static SECTION_RE: OnceLock<Regex> = OnceLock::new();

fn section_regex() -> &'static Regex {
    SECTION_RE.get_or_init(|| Regex::new(r"(?i)^\s*--\s*\+(up|down)\s*$").expect("valid regex"))
}

/// Plain SQL script split by `-- +up` / `-- +down` marker lines.
#[derive(Debug, Clone)]
pub struct SqlScript {
    name: ScriptName,
    up: String,
    down: String,
}

impl SqlScript {
    /// Parse script text. Text before the first marker is ignored.
    pub fn parse(name: ScriptName, content: &str) -> MigrationResult<Self> {
        let mut up: Option<Vec<&str>> = None;
        let mut down: Option<Vec<&str>> = None;
        let mut current: Option<Direction> = None;

        for line in content.lines() {
            if let Some(caps) = section_regex().captures(line) {
                let direction = if caps[1].eq_ignore_ascii_case("up") {
                    Direction::Up
                } else {
                    Direction::Down
                };
                let slot = match direction {
                    Direction::Up => &mut up,
                    Direction::Down => &mut down,
                };
                if slot.is_some() {
                    return Err(MigrationError::InvalidScript {
                        name: name.to_string(),
                        message: format!("'{direction}' section declared twice"),
                    });
                }
                *slot = Some(Vec::new());
                current = Some(direction);
                continue;
            }
            match current {
                Some(Direction::Up) => up.get_or_insert_with(Vec::new).push(line),
                Some(Direction::Down) => down.get_or_insert_with(Vec::new).push(line),
                None => {}
            }
        }

        let up = up.ok_or_else(|| MigrationError::MissingOperation {
            name: name.to_string(),
            direction: Direction::Up,
        })?;
        let down = down.ok_or_else(|| MigrationError::MissingOperation {
            name: name.to_string(),
            direction: Direction::Down,
        })?;

        Ok(Self {
            name,
            up: up.join("\n").trim().to_string(),
            down: down.join("\n").trim().to_string(),
        })
    }

    pub fn sql(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

#[async_trait]
impl Script for SqlScript {
    fn name(&self) -> &ScriptName {
        &self.name
    }

    async fn up(&self, schema: &SchemaHandle<'_>, _types: &TypeRegistry) -> MigrationResult<()> {
        schema.execute(&self.up).await
    }

    async fn down(&self, schema: &SchemaHandle<'_>, _types: &TypeRegistry) -> MigrationResult<()> {
        schema.execute(&self.down).await
    }
}

/// A structured schema operation in a YAML script.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOp {
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    RemoveColumn {
        table: String,
        column: String,
    },
    AddIndex(IndexSpec),
    RemoveIndex(IndexSpec),
    Sql(String),
}

#[derive(Debug, Deserialize)]
struct TableBody {
    name: String,
    columns: Vec<ColumnSpec>,
}

#[derive(Debug, Deserialize)]
struct ColumnChange {
    table: String,
    column: ColumnSpec,
}

#[derive(Debug, Deserialize)]
struct ColumnRef {
    table: String,
    column: String,
}

/// One list entry; exactly one key may be set.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOp {
    create_table: Option<TableBody>,
    drop_table: Option<String>,
    add_column: Option<ColumnChange>,
    remove_column: Option<ColumnRef>,
    add_index: Option<IndexSpec>,
    remove_index: Option<IndexSpec>,
    sql: Option<String>,
}

impl RawOp {
    fn into_op(self) -> Result<SchemaOp, String> {
        let mut ops = Vec::new();
        if let Some(t) = self.create_table {
            ops.push(SchemaOp::CreateTable {
                table: t.name,
                columns: t.columns,
            });
        }
        if let Some(table) = self.drop_table {
            ops.push(SchemaOp::DropTable { table });
        }
        if let Some(c) = self.add_column {
            ops.push(SchemaOp::AddColumn {
                table: c.table,
                column: c.column,
            });
        }
        if let Some(c) = self.remove_column {
            ops.push(SchemaOp::RemoveColumn {
                table: c.table,
                column: c.column,
            });
        }
        if let Some(i) = self.add_index {
            ops.push(SchemaOp::AddIndex(i));
        }
        if let Some(i) = self.remove_index {
            ops.push(SchemaOp::RemoveIndex(i));
        }
        if let Some(sql) = self.sql {
            ops.push(SchemaOp::Sql(sql));
        }
        match ops.len() {
            1 => Ok(ops.remove(0)),
            0 => Err("empty operation".to_string()),
            n => Err(format!("operation entry sets {n} keys, expected exactly one")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawYamlScript {
    up: Option<Vec<RawOp>>,
    down: Option<Vec<RawOp>>,
}

/// Script described as YAML lists of [`SchemaOp`]s.
#[derive(Debug, Clone)]
pub struct YamlScript {
    name: ScriptName,
    up: Vec<SchemaOp>,
    down: Vec<SchemaOp>,
}

impl YamlScript {
    pub fn parse(name: ScriptName, content: &str) -> MigrationResult<Self> {
        let raw: RawYamlScript =
            serde_yaml::from_str(content).map_err(|e| MigrationError::InvalidScript {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let convert = |ops: Option<Vec<RawOp>>, direction: Direction| {
            let ops = ops.ok_or_else(|| MigrationError::MissingOperation {
                name: name.to_string(),
                direction,
            })?;
            ops.into_iter()
                .map(RawOp::into_op)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|message| MigrationError::InvalidScript {
                    name: name.to_string(),
                    message,
                })
        };

        let up = convert(raw.up, Direction::Up)?;
        let down = convert(raw.down, Direction::Down)?;
        Ok(Self { name, up, down })
    }

    pub fn ops(&self, direction: Direction) -> &[SchemaOp] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    async fn run_ops(&self, schema: &SchemaHandle<'_>, ops: &[SchemaOp]) -> MigrationResult<()> {
        for op in ops {
            match op {
                SchemaOp::CreateTable { table, columns } => {
                    schema.create_table(table, columns).await?
                }
                SchemaOp::DropTable { table } => schema.drop_table(table).await?,
                SchemaOp::AddColumn { table, column } => schema.add_column(table, column).await?,
                SchemaOp::RemoveColumn { table, column } => {
                    schema.remove_column(table, column).await?
                }
                SchemaOp::AddIndex(index) => schema.add_index(index).await?,
                SchemaOp::RemoveIndex(index) => schema.remove_index(index).await?,
                SchemaOp::Sql(sql) => schema.execute(sql).await?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Script for YamlScript {
    fn name(&self) -> &ScriptName {
        &self.name
    }

    async fn up(&self, schema: &SchemaHandle<'_>, _types: &TypeRegistry) -> MigrationResult<()> {
        self.run_ops(schema, &self.up).await
    }

    async fn down(&self, schema: &SchemaHandle<'_>, _types: &TypeRegistry) -> MigrationResult<()> {
        self.run_ops(schema, &self.down).await
    }
}

/// Discovers file scripts and merges registered ones into a single ordered
/// sequence.
pub struct ScriptLoader {
    dir: PathBuf,
    registered: Vec<Arc<dyn Script>>,
}

impl ScriptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registered: Vec::new(),
        }
    }

    /// Add a script implemented in code
    pub fn register(&mut self, script: Arc<dyn Script>) -> &mut Self {
        self.registered.push(script);
        self
    }

    /// Load every script, sorted by name.
    ///
    /// A missing operation or duplicate name aborts loading.
    pub fn load(&self) -> MigrationResult<Vec<Arc<dyn Script>>> {
        let mut by_name: BTreeMap<ScriptName, Arc<dyn Script>> = BTreeMap::new();

        let discovered = discover_scripts(&self.dir)?;
        for script in discovered.into_iter().chain(self.registered.iter().cloned()) {
            let name = script.name().clone();
            if by_name.insert(name.clone(), script).is_some() {
                return Err(MigrationError::DuplicateScript {
                    name: name.into_inner(),
                });
            }
        }

        log::debug!(
            "Loaded {} migration script(s) from {}",
            by_name.len(),
            self.dir.display()
        );
        Ok(by_name.into_values().collect())
    }
}

/// Parse every `.sql` / `.yml` / `.yaml` file in `dir`, skipping hidden files.
///
/// Order is not significant here; [`ScriptLoader::load`] sorts.
pub fn discover_scripts(dir: &Path) -> MigrationResult<Vec<Arc<dyn Script>>> {
    if !dir.is_dir() {
        return Err(MigrationError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| MigrationError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut scripts: Vec<Arc<dyn Script>> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') {
            continue;
        }
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        let Some(name) = ScriptName::try_new(stem) else {
            continue;
        };

        let script: Arc<dyn Script> = match ext {
            "sql" => Arc::new(SqlScript::parse(name, &read_script(&path)?)?),
            "yml" | "yaml" => Arc::new(YamlScript::parse(name, &read_script(&path)?)?),
            _ => {
                log::debug!("Ignoring non-script file {}", path.display());
                continue;
            }
        };
        scripts.push(script);
    }
    Ok(scripts)
}

fn read_script(path: &Path) -> MigrationResult<String> {
    std::fs::read_to_string(path).map_err(|e| MigrationError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
