// Payroll payloads relayed to OpenPaye, with structural validation

use crate::error::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Employee record sent to the OpenPaye employee-creation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Employee {
    pub firstname: String,
    pub lastname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

impl Employee {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("employee.firstname", &self.firstname)?;
        require("employee.lastname", &self.lastname)?;

        if let Some(email) = &self.email {
            validate_email("employee.email", email)?;
        }
        if let Some(start_date) = &self.start_date {
            parse_date("employee.start_date", start_date)?;
        }

        Ok(())
    }
}

/// Contract record sent to the OpenPaye contract-creation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contract {
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl Contract {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let start = parse_date("contract.start_date", &self.start_date)?;

        if let Some(end_date) = &self.end_date {
            let end = parse_date("contract.end_date", end_date)?;
            if end < start {
                return Err(ValidationError::EndBeforeStart {
                    start: self.start_date.clone(),
                    end: end_date.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Arguments of the `create_employee` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmployeeArgs {
    pub client_id: String,
    pub employee: Employee,
}

impl CreateEmployeeArgs {
    /// Parse and validate raw tool arguments
    pub fn parse(arguments: serde_json::Value) -> Result<Self, ValidationError> {
        let mut args: Self = serde_json::from_value(arguments)?;
        args.client_id = normalize_client_id(&args.client_id)?;
        args.employee.validate()?;
        Ok(args)
    }
}

/// Arguments of the `create_contract` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContractArgs {
    pub client_id: String,
    pub employee_id: String,
    pub contract: Contract,
}

impl CreateContractArgs {
    /// Parse and validate raw tool arguments
    pub fn parse(arguments: serde_json::Value) -> Result<Self, ValidationError> {
        let mut args: Self = serde_json::from_value(arguments)?;
        args.client_id = normalize_client_id(&args.client_id)?;
        require("employee_id", &args.employee_id)?;
        args.contract.validate()?;
        Ok(args)
    }
}

/// Reject empty or whitespace-only values
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(())
}

/// Client ids are stored trimmed by the registration form, so lookups trim too
pub fn normalize_client_id(value: &str) -> Result<String, ValidationError> {
    require("client_id", value)?;
    Ok(value.trim().to_string())
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    };

    // chrono accepts unpadded months and days, the upstream API does not
    if value.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

fn validate_email(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail {
            field,
            value: value.to_string(),
        })
    }
}
