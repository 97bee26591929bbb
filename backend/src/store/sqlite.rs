use crate::error::PipelineError;
use crate::pipeline::bulk::BulkInsert;
use common::model::report::Page;
use common::model::student::{ParseClassError, StudentClass, StudentRecord};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id  INTEGER NOT NULL,
    first_name  TEXT    NOT NULL,
    last_name   TEXT    NOT NULL,
    dob         TEXT    NOT NULL,
    class       TEXT    NOT NULL,
    score       REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS students_student_id ON students (student_id);
CREATE INDEX IF NOT EXISTS students_class ON students (class);
";

const INSERT: &str = "INSERT INTO students (student_id, first_name, last_name, dob, class, score) \
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const COLUMNS: &str = "student_id, first_name, last_name, dob, class, score";

/// Concurrent loads each open their own connection and wait on each other's
/// write locks for at most this long.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 1_000;

/// Maps a sortable report field to its column.
fn sort_column(field: &str) -> Option<&'static str> {
    Some(match field {
        "id" | "studentId" => "student_id",
        "firstName" => "first_name",
        "lastName" => "last_name",
        "dateOfBirth" => "dob",
        "class" | "studentClass" => "class",
        "score" => "score",
        _ => return None,
    })
}

/// Optional report filters; `None` matches everything.
#[derive(Clone, Debug, Default)]
pub struct StudentFilter {
    pub student_id: Option<i64>,
    pub class: Option<StudentClass>,
}

impl StudentFilter {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = self.student_id {
            clauses.push("student_id = ?");
            values.push(Value::Integer(id));
        }
        if let Some(class) = self.class {
            clauses.push("class = ?");
            values.push(Value::Text(class.as_str().to_string()));
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    sort_column: &'static str,
    pub descending: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort_column: "student_id",
            descending: false,
        }
    }
}

impl PageRequest {
    /// Builds a page request from user input.
    ///
    /// Fails with a readable message when `sort_by` is not a sortable field
    /// or `sort_dir` is neither `asc` nor `desc`. `size` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(
        page: Option<u32>,
        size: Option<u32>,
        sort_by: Option<&str>,
        sort_dir: Option<&str>,
    ) -> Result<Self, String> {
        let defaults = PageRequest::default();
        let sort_column = match sort_by {
            Some(field) => {
                sort_column(field).ok_or_else(|| format!("cannot sort by '{}'", field))?
            }
            None => defaults.sort_column,
        };
        let descending = match sort_dir.map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => return Err(format!("invalid sort direction '{}'", other)),
        };
        Ok(PageRequest {
            page: page.unwrap_or(defaults.page),
            size: size.unwrap_or(defaults.size).clamp(1, MAX_PAGE_SIZE),
            sort_column,
            descending,
        })
    }

    fn order_by(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!(" ORDER BY {} {}, id ASC", self.sort_column, direction)
    }
}

/// SQLite-backed student table.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PipelineError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }

    pub fn count(&self, filter: &StudentFilter) -> Result<u64, PipelineError> {
        let (clause, values) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM students{}", clause);
        let total: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(total as u64)
    }

    pub fn find_page(
        &self,
        filter: &StudentFilter,
        request: &PageRequest,
    ) -> Result<Page<StudentRecord>, PipelineError> {
        let total = self.count(filter)?;
        let (clause, mut values) = filter.where_clause();
        let sql = format!(
            "SELECT {} FROM students{}{} LIMIT ? OFFSET ?",
            COLUMNS,
            clause,
            request.order_by()
        );
        values.push(Value::Integer(i64::from(request.size)));
        values.push(Value::Integer(
            i64::from(request.page) * i64::from(request.size),
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let content = stmt
            .query_map(params_from_iter(values), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(content, request.page, request.size, total))
    }

    /// Streams every matching record, in load order, into `visit`.
    /// Returns the number of records visited.
    pub fn for_each<F>(&self, filter: &StudentFilter, mut visit: F) -> Result<u64, PipelineError>
    where
        F: FnMut(StudentRecord) -> Result<(), PipelineError>,
    {
        let (clause, values) = filter.where_clause();
        let sql = format!("SELECT {} FROM students{} ORDER BY id ASC", COLUMNS, clause);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut visited = 0;
        while let Some(row) = rows.next()? {
            visit(record_from_row(row)?)?;
            visited += 1;
        }
        Ok(visited)
    }
}

impl BulkInsert for SqliteStore {
    fn insert_batch(&mut self, rows: &[StudentRecord]) -> Result<(), PipelineError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT)?;
            for record in rows {
                stmt.execute(params![
                    record.student_id,
                    record.first_name,
                    record.last_name,
                    record.date_of_birth,
                    record.class.as_str(),
                    record.score,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    let class: String = row.get(4)?;
    let class = class.parse::<StudentClass>().map_err(|err: ParseClassError| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err))
    })?;
    Ok(StudentRecord {
        student_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        date_of_birth: row.get(3)?,
        class,
        score: row.get(5)?,
    })
}
