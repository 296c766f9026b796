pub mod payroll;
mod registry;

pub use payroll::{missing_credential_message, CreateContractTool, CreateEmployeeTool};
pub use registry::{
    json_schema_closed_object, json_schema_date, json_schema_object, json_schema_string, Tool,
    ToolRegistry,
};
