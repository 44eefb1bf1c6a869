//! Record Models
//! Mission: Define user-owned income and expense data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to an uploaded file. The record layer never touches the bytes,
/// only this pair produced by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    pub filename: String,
}

/// One line of an expense record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseItem {
    pub description: String,
    pub amount: f64,
}

/// Income record, owned exclusively by `created_by`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub id: Uuid,
    pub amount: f64,
    pub slip: Option<FileRef>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expense record, owned exclusively by `created_by`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: Uuid,
    pub items: Vec<ExpenseItem>,
    pub total_amount: f64,
    pub images: Vec<FileRef>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated income payload (create and update share the same shape)
#[derive(Debug, Clone)]
pub struct IncomePayload {
    pub amount: f64,
    pub notes: Option<String>,
}

impl IncomePayload {
    /// Build from raw form fields, rejecting missing or non-numeric amounts
    pub fn from_fields(amount: Option<&str>, notes: Option<String>) -> Result<Self, String> {
        let raw = amount.ok_or_else(|| "Amount is required".to_string())?;
        let amount = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid amount: {raw}"))?;
        if !amount.is_finite() {
            return Err(format!("Invalid amount: {raw}"));
        }
        Ok(Self { amount, notes })
    }
}

/// Validated expense payload (create and update share the same shape)
#[derive(Debug, Clone)]
pub struct ExpensePayload {
    pub items: Vec<ExpenseItem>,
    pub total_amount: f64,
    pub notes: Option<String>,
}

impl ExpensePayload {
    /// Build from raw form fields. `items` arrives as a JSON array string.
    pub fn from_fields(
        items: Option<&str>,
        total_amount: Option<&str>,
        notes: Option<String>,
    ) -> Result<Self, String> {
        let raw_items = items.ok_or_else(|| "Items are required".to_string())?;
        let items: Vec<ExpenseItem> =
            serde_json::from_str(raw_items).map_err(|e| format!("Invalid items: {e}"))?;
        if items.is_empty() {
            return Err("Items must not be empty".to_string());
        }
        for item in &items {
            if item.description.trim().is_empty() {
                return Err("Item description is required".to_string());
            }
            if !item.amount.is_finite() {
                return Err("Item amount must be numeric".to_string());
            }
        }

        let raw_total = total_amount.ok_or_else(|| "Total amount is required".to_string())?;
        let total_amount = raw_total
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Invalid total amount: {raw_total}"))?;
        if !total_amount.is_finite() {
            return Err(format!("Invalid total amount: {raw_total}"));
        }

        Ok(Self {
            items,
            total_amount,
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_income_payload_requires_amount() {
        let err = IncomePayload::from_fields(None, None).unwrap_err();
        assert_eq!(err, "Amount is required");

        let err = IncomePayload::from_fields(Some("abc"), None).unwrap_err();
        assert!(err.contains("Invalid amount"));

        let ok = IncomePayload::from_fields(Some("1500.25"), Some("salary".to_string())).unwrap();
        assert_eq!(ok.amount, 1500.25);
        assert_eq!(ok.notes.as_deref(), Some("salary"));
    }

    #[test]
    fn test_expense_payload_requires_nonempty_items() {
        let err = ExpensePayload::from_fields(Some("[]"), Some("1"), None).unwrap_err();
        assert_eq!(err, "Items must not be empty");

        let err = ExpensePayload::from_fields(Some("not json"), Some("1"), None).unwrap_err();
        assert!(err.contains("Invalid items"));

        let err = ExpensePayload::from_fields(
            Some(r#"[{"description":"","amount":1.0}]"#),
            Some("1"),
            None,
        )
        .unwrap_err();
        assert_eq!(err, "Item description is required");
    }

    #[test]
    fn test_expense_payload_parses_items() {
        let payload = ExpensePayload::from_fields(
            Some(r#"[{"description":"coffee","amount":3.5}]"#),
            Some("3.5"),
            None,
        )
        .unwrap();

        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].description, "coffee");
        assert_eq!(payload.total_amount, 3.5);
    }

    #[test]
    fn test_expense_payload_requires_total() {
        let err = ExpensePayload::from_fields(
            Some(r#"[{"description":"coffee","amount":3.5}]"#),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, "Total amount is required");
    }
}
