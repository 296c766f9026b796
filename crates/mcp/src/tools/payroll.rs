// Payroll tools relaying to the OpenPaye API with per-client credentials

use crate::client::OpenPayeClient;
use crate::protocol::ToolSchema;
use crate::tools::{
    json_schema_closed_object, json_schema_date, json_schema_object, json_schema_string, Tool,
};
use openpaye_relay_core::payroll::{CreateContractArgs, CreateEmployeeArgs};
use openpaye_relay_core::storage::CredentialStore;
use openpaye_relay_core::{ClientId, Credential, Envelope, ValidationError};
use std::sync::Arc;

/// Error reported when a client has not registered OpenPaye access yet
pub fn missing_credential_message(client_id: &str) -> String {
    format!(
        "no access found for client '{}', register via the connect flow at /connect",
        client_id
    )
}

/// Look up a client's credential, turning absence or store failure into a
/// failed envelope.
async fn resolve_credential(
    credentials: &dyn CredentialStore,
    client_id: &str,
) -> Result<Credential, Envelope> {
    match credentials.get(&ClientId::new(client_id)).await {
        Ok(Some(credential)) => Ok(credential),
        Ok(None) => {
            tracing::info!(client_id = %client_id, "No credential registered");
            Err(Envelope::failure(missing_credential_message(client_id)))
        }
        Err(e) => {
            tracing::error!(client_id = %client_id, "Credential lookup failed: {:#}", e);
            Err(Envelope::failure(format!("{:#}", e)))
        }
    }
}

fn client_id_schema() -> serde_json::Value {
    json_schema_string("Identifier the client registered its OpenPaye access under")
}

/// Tool to create an employee in the client's dossier
pub struct CreateEmployeeTool {
    credentials: Arc<dyn CredentialStore>,
    openpaye: Arc<OpenPayeClient>,
}

impl CreateEmployeeTool {
    pub fn new(credentials: Arc<dyn CredentialStore>, openpaye: Arc<OpenPayeClient>) -> Self {
        Self {
            credentials,
            openpaye,
        }
    }
}

#[async_trait::async_trait]
impl Tool for CreateEmployeeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_employee".to_string(),
            description: "Create an employee in the OpenPaye dossier registered for client_id"
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "client_id": client_id_schema(),
                    "employee": json_schema_closed_object(
                        serde_json::json!({
                            "firstname": json_schema_string("First name"),
                            "lastname": json_schema_string("Last name"),
                            "email": json_schema_string("Email address"),
                            "start_date": json_schema_date("Hiring date (YYYY-MM-DD)")
                        }),
                        vec!["firstname", "lastname"],
                        "Employee to create"
                    )
                }),
                vec!["client_id", "employee"],
            ),
            output_schema: Some(Envelope::json_schema()),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<Envelope, ValidationError> {
        let args = CreateEmployeeArgs::parse(arguments)?;

        let credential = match resolve_credential(self.credentials.as_ref(), &args.client_id).await
        {
            Ok(credential) => credential,
            Err(envelope) => return Ok(envelope),
        };

        tracing::info!(
            client_id = %args.client_id,
            dossier_id = %credential.dossier_id,
            "Creating employee"
        );

        let result = self.openpaye.create_employee(&credential, &args.employee).await;
        Ok(Envelope::from_result(result))
    }
}

/// Tool to create a contract for an existing employee
pub struct CreateContractTool {
    credentials: Arc<dyn CredentialStore>,
    openpaye: Arc<OpenPayeClient>,
}

impl CreateContractTool {
    pub fn new(credentials: Arc<dyn CredentialStore>, openpaye: Arc<OpenPayeClient>) -> Self {
        Self {
            credentials,
            openpaye,
        }
    }
}

#[async_trait::async_trait]
impl Tool for CreateContractTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_contract".to_string(),
            description: "Create a contract for an employee in the OpenPaye dossier registered for client_id"
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "client_id": client_id_schema(),
                    "employee_id": json_schema_string("OpenPaye identifier of the employee"),
                    "contract": json_schema_closed_object(
                        serde_json::json!({
                            "start_date": json_schema_date("Contract start (YYYY-MM-DD)"),
                            "end_date": json_schema_date("Contract end (YYYY-MM-DD), omitted for open-ended contracts"),
                            "position": json_schema_string("Job title")
                        }),
                        vec!["start_date"],
                        "Contract to create"
                    )
                }),
                vec!["client_id", "employee_id", "contract"],
            ),
            output_schema: Some(Envelope::json_schema()),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<Envelope, ValidationError> {
        let args = CreateContractArgs::parse(arguments)?;

        let credential = match resolve_credential(self.credentials.as_ref(), &args.client_id).await
        {
            Ok(credential) => credential,
            Err(envelope) => return Ok(envelope),
        };

        tracing::info!(
            client_id = %args.client_id,
            dossier_id = %credential.dossier_id,
            employee_id = %args.employee_id,
            "Creating contract"
        );

        let result = self
            .openpaye
            .create_contract(&credential, &args.employee_id, &args.contract)
            .await;
        Ok(Envelope::from_result(result))
    }
}
