//! Invoice model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::record::{EntityKind, Payload};
use crate::db::values::{
    get_integer, get_opt_text, get_real, get_text, integer, opt_text, real, text,
};
use crate::error::{Error, Result};

/// Billing state of an invoice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
}

impl InvoiceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Sent => "SENT",
            Self::Paid => "PAID",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "SENT" => Ok(Self::Sent),
            "PAID" => Ok(Self::Paid),
            _ => Err(Error::InvalidInput(format!("Unknown invoice status: {s}"))),
        }
    }
}

/// An invoice issued to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Server identity of the billed client
    pub client_id: i64,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl Invoice {
    #[must_use]
    pub const fn new(client_id: i64, amount: f64) -> Self {
        Self {
            client_id,
            status: InvoiceStatus::Draft,
            amount,
            due_date: None,
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }
}

impl Payload for Invoice {
    const KIND: EntityKind = EntityKind::Invoices;
    const COLUMNS: &'static [&'static str] = &["client_id", "status", "amount", "due_date"];
    const INDEXED: &'static [&'static str] = &["client_id", "status"];

    fn to_values(&self) -> Vec<libsql::Value> {
        vec![
            integer(self.client_id),
            text(self.status.as_str()),
            real(self.amount),
            opt_text(self.due_date.as_deref()),
        ]
    }

    fn from_row(row: &libsql::Row, offset: i32) -> Result<Self> {
        Ok(Self {
            client_id: get_integer(row, offset)?,
            status: get_text(row, offset + 1)?.parse()?,
            amount: get_real(row, offset + 2)?,
            due_date: get_opt_text(row, offset + 3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let invoice = Invoice::new(3, 120.5).with_status(InvoiceStatus::Sent);
        let body = serde_json::to_value(&invoice).unwrap();
        assert_eq!(body["status"], "SENT");
        assert_eq!(body["client_id"], 3);
    }

    #[test]
    fn test_server_defaults() {
        let invoice: Invoice = serde_json::from_str(r#"{"client_id": 9}"#).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(invoice.amount.abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("paid".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Paid);
        assert!("void".parse::<InvoiceStatus>().is_err());
    }
}
