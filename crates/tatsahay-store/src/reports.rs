use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension};
use uuid::Uuid;

use tatsahay_shared::{
    Coordinates, Report, ReportId, UnsavedReport, UserId, VerificationState,
};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ReportFilter, ReportSort, Visibility};

const REPORT_COLUMNS: &str = "id, submission_key, author_id, disaster_type, location, description, \
     severity, latitude, longitude, image_ref, created_at, verification_state";

// Fixed-width so that lexical order in SQLite equals chronological order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Persist a new report, assigning its `id` and `created_at`.
    ///
    /// Runs in a single transaction. When a report with the same submission
    /// key already exists it is returned unchanged, so a retried write never
    /// produces a second record.
    pub fn create_report(&mut self, unsaved: &UnsavedReport) -> Result<Report> {
        let tx = self.conn_mut().transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE submission_key = ?1"),
                params![unsaved.submission_key.to_string()],
                row_to_report,
            )
            .optional()?;

        if let Some(report) = existing {
            tx.commit()?;
            tracing::debug!(
                id = %report.id,
                submission = %unsaved.submission_key,
                "submission already persisted"
            );
            return Ok(report);
        }

        let report = Report {
            id: ReportId::new(),
            author_id: unsaved.author_id.clone(),
            disaster_type: unsaved.disaster_type,
            location: unsaved.location.clone(),
            description: unsaved.description.clone(),
            severity: unsaved.severity,
            coordinates: unsaved.coordinates,
            image_ref: Some(unsaved.image_ref.clone()),
            created_at: Utc::now().trunc_subsecs(6),
            verification_state: VerificationState::Unverified,
            submission_key: unsaved.submission_key,
        };

        tx.execute(
            &format!(
                "INSERT INTO reports ({REPORT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                report.id.to_string(),
                report.submission_key.to_string(),
                report.author_id.as_str(),
                report.disaster_type.as_str(),
                report.location,
                report.description,
                report.severity.as_str(),
                report.coordinates.map(|c| c.latitude),
                report.coordinates.map(|c| c.longitude),
                report.image_ref,
                format_ts(&report.created_at),
                report.verification_state.as_str(),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(id = %report.id, author = %report.author_id, "report created");
        Ok(report)
    }

    /// The report written by a submission attempt, if it got committed.
    pub fn find_by_submission_key(&self, key: Uuid) -> Result<Option<Report>> {
        let report = self
            .conn()
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE submission_key = ?1"),
                params![key.to_string()],
                row_to_report,
            )
            .optional()?;
        Ok(report)
    }

    pub fn get_report(&self, id: ReportId) -> Result<Report> {
        self.conn()
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"),
                params![id.to_string()],
                row_to_report,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List reports matching `filter` in a single statement, so the result
    /// is one consistent snapshot.
    pub fn list_reports(&self, filter: &ReportFilter, sort: ReportSort) -> Result<Vec<Report>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        match filter.visibility {
            Visibility::Any => {}
            Visibility::Public => clauses.push("verification_state <> 'Rejected'"),
            Visibility::VerifiedOnly => clauses.push("verification_state = 'Verified'"),
        }
        if let Some(kind) = filter.disaster_type {
            clauses.push("disaster_type = ?");
            args.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(author) = &filter.author {
            clauses.push("author_id = ?");
            args.push(Value::Text(author.as_str().to_string()));
        }

        let mut sql = format!("SELECT {REPORT_COLUMNS} FROM reports");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(match sort {
            ReportSort::NewestFirst => " ORDER BY created_at DESC, id DESC",
            ReportSort::OldestFirst => " ORDER BY created_at ASC, id ASC",
        });
        if filter.limit.is_some() || filter.offset > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(Value::Integer(filter.limit.map_or(-1, i64::from)));
            args.push(Value::Integer(i64::from(filter.offset)));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), row_to_report)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    /// Every report by one author, newest first, in any verification state.
    pub fn list_reports_by_author(&self, author: &UserId) -> Result<Vec<Report>> {
        self.list_reports(&ReportFilter::by_author(author), ReportSort::NewestFirst)
    }

    pub fn set_verification(&self, id: ReportId, state: VerificationState) -> Result<Report> {
        let affected = self.conn().execute(
            "UPDATE reports SET verification_state = ?1 WHERE id = ?2",
            params![state.as_str(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_report(id)
    }

    pub fn count_reports(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn bad_column<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let id_str: String = row.get(0)?;
    let key_str: String = row.get(1)?;
    let author_id: String = row.get(2)?;
    let disaster_str: String = row.get(3)?;
    let location: String = row.get(4)?;
    let description: String = row.get(5)?;
    let severity_str: String = row.get(6)?;
    let latitude: Option<f64> = row.get(7)?;
    let longitude: Option<f64> = row.get(8)?;
    let image_ref: Option<String> = row.get(9)?;
    let created_str: String = row.get(10)?;
    let state_str: String = row.get(11)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| bad_column(0, e))?;
    let submission_key = Uuid::parse_str(&key_str).map_err(|e| bad_column(1, e))?;
    let disaster_type = disaster_str.parse().map_err(|e| bad_column(3, e))?;
    let severity = severity_str.parse().map_err(|e| bad_column(6, e))?;

    let coordinates = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad_column(10, e))?;

    let verification_state = state_str.parse().map_err(|e| bad_column(11, e))?;

    Ok(Report {
        id: ReportId(id),
        author_id: UserId(author_id),
        disaster_type,
        location,
        description,
        severity,
        coordinates,
        image_ref,
        created_at,
        verification_state,
        submission_key,
    })
}
