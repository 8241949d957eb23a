use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::CrmConfig,
    error::{AppError, AppResult},
    HttpClient,
};

use super::{ActivityDirection, ActivityOutcome, CrmClient, CrmRecord};

pub struct SalesforceClient {
    http_client: HttpClient,
    cfg: CrmConfig,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    records: Vec<SObjectRecord>,
}

#[derive(Debug, Deserialize)]
struct SObjectRecord {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "FirstName")]
    first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateError {
    message: String,
    #[serde(rename = "errorCode")]
    #[allow(dead_code)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: Option<String>,
    success: bool,
    #[serde(default)]
    errors: Vec<CreateError>,
}

impl SalesforceClient {
    pub fn new(http_client: HttpClient, cfg: CrmConfig) -> Self {
        Self { http_client, cfg }
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/{}/{}",
            self.cfg.instance_url.as_str().trim_end_matches('/'),
            self.cfg.api_version,
            path
        )
    }

    async fn query(&self, soql: &str) -> AppResult<QueryResponse> {
        let resp = self
            .http_client
            .get(self.data_url("query"))
            .query(&[("q", soql)])
            .bearer_auth(&self.cfg.access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Salesforce query failed: {} {}", status, body).into());
        }

        let data = resp
            .json::<QueryResponse>()
            .await
            .context("Could not parse Salesforce query response")?;

        Ok(data)
    }

    async fn create_sobject(
        &self,
        sobject: &str,
        fields: &serde_json::Value,
    ) -> AppResult<CreateResponse> {
        let resp = self
            .http_client
            .post(self.data_url(&format!("sobjects/{}", sobject)))
            .bearer_auth(&self.cfg.access_token)
            .json(fields)
            .send()
            .await?;

        // Salesforce reports field-level failures as a 400 with an error
        // array; surface those as a parsed response, not a transport error.
        let status = resp.status();
        let body = resp.text().await?;

        if let Ok(parsed) = serde_json::from_str::<CreateResponse>(&body) {
            return Ok(parsed);
        }
        if let Ok(errors) = serde_json::from_str::<Vec<CreateError>>(&body) {
            return Ok(CreateResponse {
                id: None,
                success: false,
                errors,
            });
        }

        Err(anyhow!("Salesforce {} create failed: {} {}", sobject, status, body).into())
    }
}

fn escape_soql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl CrmClient for SalesforceClient {
    async fn find_contact_or_lead_by_email(
        &self,
        address: &str,
    ) -> AppResult<Option<CrmRecord>> {
        let escaped = escape_soql_literal(address);

        for sobject in ["Contact", "Lead"] {
            let soql = format!(
                "SELECT Id, FirstName FROM {} WHERE Email = '{}' LIMIT 1",
                sobject, escaped
            );
            if let Some(record) = self.query(&soql).await?.records.into_iter().next() {
                return Ok(Some(CrmRecord {
                    id: record.id,
                    first_name: record.first_name,
                }));
            }
        }

        Ok(None)
    }

    async fn create_lead(&self, address: &str) -> AppResult<CrmRecord> {
        let fields = json!({
            "Email": address,
            "LastName": "Unknown",
            "Company": "Unknown",
        });

        let created = self.create_sobject("Lead", &fields).await?;
        if !created.success {
            let detail = created
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(AppError::BadRequest(format!(
                "Could not create lead for {}: {}",
                address, detail
            )));
        }

        let id = created.id.context("Lead create response carried no id")?;

        Ok(CrmRecord {
            id,
            first_name: None,
        })
    }

    async fn log_activity(
        &self,
        person_id: &str,
        subject: &str,
        body: &str,
        direction: ActivityDirection,
    ) -> AppResult<ActivityOutcome> {
        let fields = json!({
            "WhoId": person_id,
            "Subject": subject,
            "Description": body,
            "Status": "Completed",
            "TaskSubtype": "Email",
            "Type": format!("Email - {}", direction),
        });

        let created = self.create_sobject("Task", &fields).await?;

        Ok(ActivityOutcome {
            success: created.success,
            id: created.id,
            error: created.errors.first().map(|e| e.message.clone()),
        })
    }
}
