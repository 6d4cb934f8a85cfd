//! In-memory indexed store of decoded messages with `hdr`-keyed
//! supersession and SQL-like read queries (spec §4.2).
//!
//! Backed by an in-process SQLite database opened with `rusqlite`
//! (spec §9, option (a)): a single `messages` table gives `add()` its
//! supersede-on-conflict semantics via a `UNIQUE` constraint on `hdr`,
//! and `qry_field` executes the caller's own parameterized `SELECT`
//! directly through the connection rather than hand-rolling a predicate
//! evaluator over the in-memory rows.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::ProtocolError;
use crate::header::{Code, Header, PartyId, Verb};
use crate::message::Message;

/// A single cell of a [`MessageIndex::qry_field`] result row.
pub type QueryValue = rusqlite::types::Value;

const SCHEMA: &str = "
CREATE TABLE messages (
    seq     INTEGER PRIMARY KEY AUTOINCREMENT,
    hdr     TEXT NOT NULL UNIQUE,
    code    TEXT NOT NULL,
    verb    TEXT NOT NULL,
    src     TEXT NOT NULL,
    dst     TEXT NOT NULL,
    ctx     TEXT,
    dtm     TEXT NOT NULL,
    plk     TEXT NOT NULL,
    payload TEXT NOT NULL
);
";

/// Indexed store of decoded [`Message`]s, keyed on [`Header`].
pub struct MessageIndex {
    conn: Mutex<Connection>,
}

impl MessageIndex {
    /// Open a fresh, empty index backed by an in-memory SQLite database.
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory sqlite connection");
        conn.execute_batch(SCHEMA)
            .expect("create messages schema");
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Insert `msg`, keyed on `msg.hdr`. If a row with the same header
    /// already existed it is replaced in place (preserving its original
    /// insertion position) and returned; otherwise returns `None`.
    pub fn add(&self, msg: Message) -> Option<Message> {
        let conn = self.conn.lock().expect("message index connection poisoned");
        let previous = Self::select_one(&conn, "hdr = ?1", params![msg.hdr.to_string()]);

        let ctx = msg.ctx.clone();
        let payload = serde_json::to_string(&msg.payload).expect("serialize message payload");
        conn.execute(
            "INSERT INTO messages (hdr, code, verb, src, dst, ctx, dtm, plk, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(hdr) DO UPDATE SET
                code = excluded.code,
                verb = excluded.verb,
                src = excluded.src,
                dst = excluded.dst,
                ctx = excluded.ctx,
                dtm = excluded.dtm,
                plk = excluded.plk,
                payload = excluded.payload",
            params![
                msg.hdr.to_string(),
                msg.code.as_hex(),
                msg.verb.as_wire_str().trim(),
                msg.src.as_str(),
                msg.dst.as_str(),
                ctx,
                msg.dtm.to_rfc3339(),
                msg.plk,
                payload,
            ],
        )
        .expect("insert/replace message row");

        if previous.is_some() {
            debug!(hdr = %msg.hdr, "message index superseded existing row");
        }
        previous
    }

    /// Whether a row matches every `Some` field given. `plk` matches as a
    /// substring against the stored, `|`-framed `plk` column.
    #[allow(clippy::too_many_arguments)]
    pub fn contains(
        &self,
        code: Option<Code>,
        verb: Option<Verb>,
        src: Option<&PartyId>,
        dst: Option<&PartyId>,
        ctx: Option<&str>,
        plk: Option<&str>,
    ) -> bool {
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(code) = code {
            clauses.push("code = ?");
            values.push(Box::new(code.as_hex()));
        }
        if let Some(verb) = verb {
            clauses.push("verb = ?");
            values.push(Box::new(verb.as_wire_str().trim().to_owned()));
        }
        if let Some(src) = src {
            clauses.push("src = ?");
            values.push(Box::new(src.as_str().to_owned()));
        }
        if let Some(dst) = dst {
            clauses.push("dst = ?");
            values.push(Box::new(dst.as_str().to_owned()));
        }
        if let Some(ctx) = ctx {
            clauses.push("ctx = ?");
            values.push(Box::new(ctx.to_owned()));
        }
        if let Some(plk) = plk {
            clauses.push("plk LIKE ?");
            values.push(Box::new(format!("%|{plk}|%")));
        }

        let where_clause = if clauses.is_empty() {
            "1=1".to_owned()
        } else {
            clauses.join(" AND ")
        };
        let sql = format!("SELECT 1 FROM messages WHERE {where_clause} LIMIT 1");

        let conn = self.conn.lock().expect("message index connection poisoned");
        let mut stmt = conn.prepare(&sql).expect("prepare contains() query");
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        stmt.exists(param_refs.as_slice())
            .expect("execute contains() query")
    }

    /// Look up the single row keyed by `hdr`, if any. `hdr` is the
    /// index's primary key, so there is at most one match.
    pub fn get(&self, hdr: &Header) -> Option<Message> {
        let conn = self.conn.lock().expect("message index connection poisoned");
        Self::select_one(&conn, "hdr = ?1", params![hdr.to_string()])
    }

    /// All messages, in insertion order (superseded rows keep their
    /// original position). Primarily for tests and diagnostics.
    pub fn all(&self) -> Vec<Message> {
        let conn = self.conn.lock().expect("message index connection poisoned");
        let mut stmt = conn
            .prepare("SELECT hdr, code, verb, src, dst, ctx, dtm, plk, payload FROM messages ORDER BY seq")
            .expect("prepare all() query");
        let rows = stmt
            .query_map([], Self::row_to_message)
            .expect("execute all() query");
        rows.map(|r| r.expect("decode message row")).collect()
    }

    /// Execute a read-only `SELECT`. Rejects any statement whose first
    /// non-whitespace, non-comment token is not (case-insensitively)
    /// `SELECT`.
    pub fn qry_field(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Vec<QueryValue>>, ProtocolError> {
        ensure_select_only(sql)?;
        let conn = self.conn.lock().expect("message index connection poisoned");
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ProtocolError::RejectedQuery(e.to_string()))?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map(params, move |row| {
                (0..column_count).map(|i| row.get::<_, QueryValue>(i)).collect()
            })
            .map_err(|e| ProtocolError::RejectedQuery(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProtocolError::RejectedQuery(e.to_string()))
    }

    /// Empty the index.
    pub fn clr(&self) {
        let conn = self.conn.lock().expect("message index connection poisoned");
        conn.execute("DELETE FROM messages", [])
            .expect("clear messages table");
    }

    fn select_one(
        conn: &Connection,
        where_clause: &str,
        params: impl rusqlite::Params,
    ) -> Option<Message> {
        let sql = format!(
            "SELECT hdr, code, verb, src, dst, ctx, dtm, plk, payload FROM messages WHERE {where_clause}"
        );
        conn.query_row(&sql, params, Self::row_to_message).ok()
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        let hdr: String = row.get(0)?;
        let code: String = row.get(1)?;
        let verb: String = row.get(2)?;
        let src: String = row.get(3)?;
        let dst: String = row.get(4)?;
        let ctx: Option<String> = row.get(5)?;
        let dtm: String = row.get(6)?;
        let plk: String = row.get(7)?;
        let payload: String = row.get(8)?;

        Ok(Message {
            hdr: Header::parse(&hdr).expect("stored header is well-formed"),
            code: Code::parse(&code).expect("stored code is well-formed"),
            verb: verb.parse().expect("stored verb is well-formed"),
            src: PartyId::parse(&src).expect("stored src is well-formed"),
            dst: PartyId::parse(&dst).expect("stored dst is well-formed"),
            ctx,
            dtm: DateTime::parse_from_rfc3339(&dtm)
                .expect("stored dtm is well-formed")
                .with_timezone(&Utc),
            plk,
            payload: serde_json::from_str::<JsonValue>(&payload).expect("stored payload is valid json"),
        })
    }
}

impl Default for MessageIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject anything whose first non-whitespace, non-comment token is not
/// (case-insensitively) `SELECT`.
fn ensure_select_only(sql: &str) -> Result<(), ProtocolError> {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped
                .split_once("*/")
                .map(|(_, r)| r)
                .unwrap_or("")
                .trim_start();
            continue;
        }
        break;
    }
    let first_token = rest
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    if first_token.eq_ignore_ascii_case("select") {
        Ok(())
    } else {
        Err(ProtocolError::RejectedQuery(
            "Only SELECT queries are allowed".to_owned(),
        ))
    }
}
