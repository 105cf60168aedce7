//! Text exports: transaction CSV and schedule iCalendar

use chrono::{DateTime, Duration, NaiveTime, Utc};

use vidya_types::{ScheduleTask, TransactionExport};

pub const CSV_HEADER: [&str; 11] = [
    "Transaction ID",
    "Date",
    "User Email",
    "Plan",
    "Amount",
    "Discount",
    "Final Amount",
    "Coupon Code",
    "Payment Method",
    "Status",
    "Gateway Payment ID",
];

const CRLF: &str = "\r\n";
const ICS_LINE_LIMIT: usize = 75;
const PRODID: &str = "-//Vidya//Study Planner//EN";

/// Quote a CSV field, doubling inner quotes
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut row = fields.into_iter().map(csv_field).collect::<Vec<_>>().join(",");
    row.push_str(CRLF);
    row
}

fn rupees(paise: i64) -> String {
    format!("{:.2}", paise as f64 / 100.0)
}

/// Render transactions as CSV with a fixed header
pub fn transactions_csv(rows: &[TransactionExport]) -> String {
    let mut out = csv_row(CSV_HEADER);

    for row in rows {
        let tx = &row.transaction;
        let fields = [
            tx.id.to_string(),
            tx.created_at.to_rfc3339(),
            row.user_email.clone().unwrap_or_default(),
            row.plan_name
                .clone()
                .or_else(|| tx.plan_slug.clone())
                .unwrap_or_default(),
            rupees(tx.amount_paise),
            rupees(tx.discount_paise),
            rupees(tx.final_amount_paise),
            tx.coupon_code.clone().unwrap_or_default(),
            tx.payment_method.clone().unwrap_or_default(),
            tx.status.as_str().to_string(),
            tx.gateway_payment_id.clone(),
        ];
        out.push_str(&csv_row(fields.iter().map(String::as_str)));
    }

    out
}

/// Escape TEXT values (RFC 5545 3.3.11)
pub fn ics_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Fold a content line at 75 octets without splitting a UTF-8 sequence
fn fold_line(line: &str, out: &mut String) {
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > ICS_LINE_LIMIT {
            out.push_str(CRLF);
            out.push(' ');
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str(CRLF);
}

fn ics_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn default_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Render study tasks as an iCalendar feed. Times are UTC.
pub fn schedule_ics(tasks: &[ScheduleTask], uid_domain: &str, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    for task in tasks {
        let start = task
            .scheduled_date
            .and_time(task.start_time.unwrap_or_else(default_start))
            .and_utc();
        let end = start + Duration::minutes(i64::from(task.duration_minutes.max(0)));

        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}@{}", task.id, uid_domain));
        lines.push(format!("DTSTAMP:{}", ics_timestamp(now)));
        lines.push(format!("DTSTART:{}", ics_timestamp(start)));
        lines.push(format!("DTEND:{}", ics_timestamp(end)));
        lines.push(format!("SUMMARY:{}", ics_escape(&task.title)));
        if let Some(description) = &task.description {
            lines.push(format!("DESCRIPTION:{}", ics_escape(description)));
        }
        if let Some(subject) = &task.subject {
            lines.push(format!("CATEGORIES:{}", ics_escape(subject)));
        }
        lines.push(format!(
            "STATUS:{}",
            if task.completed { "COMPLETED" } else { "CONFIRMED" }
        ));
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        fold_line(line, &mut out);
    }
    out
}

/// `attachment; filename=...` value for a download
pub fn attachment(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename.replace('"', ""))
}
