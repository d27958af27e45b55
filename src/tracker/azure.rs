use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::WorkItemSource;
use crate::config::TrackerSettings;
use crate::error::{ReportError, ReportResult};
use crate::model::work_item::{parse_timestamp, WorkItemId, WorkItemRecord};
use crate::util::html::{flatten_html, truncate_chars, MAX_CELL_CHARS};

const EPIC_QUERY: &str =
    "SELECT [System.Id] FROM workitems WHERE [System.WorkItemType] = 'Epic'";

/// How much of an error response body ends up in diagnostics.
const ERROR_BODY_CHARS: usize = 300;

pub struct AzureDevOpsClient {
    base_url: String,
    organization: String,
    project: String,
    api_version: String,
    auth_header: String,
    client: reqwest::Client,
}

impl AzureDevOpsClient {
    pub fn new(settings: &TrackerSettings) -> ReportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ReportError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            organization: settings.organization.clone(),
            project: settings.project.clone(),
            api_version: settings.api_version.clone(),
            auth_header: basic_auth_header(&settings.personal_access_token),
            client,
        })
    }

    fn wit_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/_apis/wit/{path}",
            self.base_url,
            urlencoding::encode(&self.organization),
            urlencoding::encode(&self.project),
        )
    }
}

/// Azure DevOps takes a PAT as the password half of basic auth with an empty user.
pub fn basic_auth_header(token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{token}"));
    format!("Basic {encoded}")
}

#[derive(Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems")]
    work_items: Vec<WorkItemReference>,
}

#[derive(Deserialize)]
struct WorkItemReference {
    id: u64,
}

#[derive(Deserialize)]
struct WorkItemResponse {
    id: u64,
    #[serde(default)]
    fields: WorkItemFields,
}

#[derive(Deserialize, Default)]
struct WorkItemFields {
    #[serde(rename = "System.Title")]
    title: Option<String>,
    #[serde(rename = "System.State")]
    state: Option<String>,
    #[serde(rename = "Microsoft.VSTS.Common.Priority")]
    priority: Option<u32>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.StartDate")]
    start_date: Option<String>,
    #[serde(rename = "Microsoft.VSTS.Scheduling.TargetDate")]
    target_date: Option<String>,
    #[serde(rename = "System.RevisedDate")]
    revised_date: Option<String>,
    #[serde(rename = "System.Description")]
    description: Option<String>,
}

impl WorkItemResponse {
    fn into_record(self) -> ReportResult<WorkItemRecord> {
        let id = WorkItemId(self.id);
        let fields = self.fields;
        let state = fields
            .state
            .ok_or_else(|| ReportError::Data(format!("work item {id} has no System.State")))?;
        let revised = fields
            .revised_date
            .ok_or_else(|| ReportError::Data(format!("work item {id} has no System.RevisedDate")))?;

        Ok(WorkItemRecord {
            id,
            title: truncate_chars(&fields.title.unwrap_or_default(), MAX_CELL_CHARS),
            state,
            priority: fields.priority,
            start_date: fields.start_date,
            target_date: fields.target_date,
            revised_date: parse_timestamp(&revised)?,
            description: fields.description.as_deref().and_then(flatten_html),
        })
    }
}

/// Map a non-success status onto the error taxonomy.
async fn check_status(resp: reqwest::Response) -> ReportResult<reqwest::Response> {
    let status = resp.status();
    // A rejected PAT is answered with 203 and the HTML sign-in page.
    if status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
        return Err(ReportError::Authentication(
            "personal access token was not accepted (HTTP 203 sign-in page)".into(),
        ));
    }
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let body = truncate_chars(body.trim(), ERROR_BODY_CHARS);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(ReportError::Authentication(format!("HTTP {status}: {body}")))
        }
        _ => Err(ReportError::Transport(format!("HTTP {status}: {body}"))),
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> ReportResult<T> {
    let body = resp.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ReportError::Protocol(format!("malformed {what} response: {e}")))
}

#[async_trait]
impl WorkItemSource for AzureDevOpsClient {
    fn name(&self) -> &str {
        "Azure DevOps"
    }

    async fn list_epic_ids(&self) -> ReportResult<Vec<WorkItemId>> {
        let body = serde_json::json!({ "query": EPIC_QUERY });
        let resp = self
            .client
            .post(self.wit_url("wiql"))
            .query(&[("api-version", self.api_version.as_str())])
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let wiql: WiqlResponse = read_json(check_status(resp).await?, "WIQL").await?;
        let ids: Vec<WorkItemId> = wiql.work_items.into_iter().map(|w| WorkItemId(w.id)).collect();
        tracing::info!(
            organization = %self.organization,
            project = %self.project,
            count = ids.len(),
            "listed epics"
        );
        Ok(ids)
    }

    async fn fetch_work_item(&self, id: WorkItemId) -> ReportResult<WorkItemRecord> {
        let resp = self
            .client
            .get(self.wit_url(&format!("workitems/{id}")))
            .query(&[("api-version", self.api_version.as_str()), ("$expand", "all")])
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await?;

        let item: WorkItemResponse = read_json(check_status(resp).await?, "work item").await?;
        tracing::debug!(id = %id, "fetched work item");
        item.into_record()
    }
}
