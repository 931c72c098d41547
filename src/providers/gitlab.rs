use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ItemFilter, ItemUpdate, NewItem, Tracker};
use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::model::work_item::{ItemState, IterationRef, RelationRef, UserRef, WorkItem};

const PER_PAGE: &str = "100";

pub struct GitLabClient {
    api: String,
    token: String,
    project: String,
    group: String,
    client: reqwest::Client,
}

impl GitLabClient {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            api: format!("{}/api/v4", config.url),
            token: config.token.clone(),
            project: urlencoding::encode(&config.project_id).into_owned(),
            group: urlencoding::encode(&config.group_id).into_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/projects/{}{path}", self.api, self.project)
    }

    fn group_url(&self, path: &str) -> String {
        format!("{}/groups/{}{path}", self.api, self.group)
    }

    /// Fetches the configured project and returns its full name. Fails when
    /// the project selector does not resolve.
    pub async fn check_project(&self) -> TrackerResult<String> {
        let project: GlProject = self
            .send(self.client.get(self.project_url("")))
            .await?
            .json()
            .await?;
        Ok(project.name_with_namespace)
    }

    async fn send(&self, req: RequestBuilder) -> TrackerResult<reqwest::Response> {
        let resp = req.header("PRIVATE-TOKEN", &self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TrackerError::from_status(status.as_u16(), error_message(&body)))
    }

    async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> TrackerResult<Vec<T>> {
        let mut out = Vec::new();
        let mut page: u32 = 1;
        loop {
            let req = self
                .client
                .get(url)
                .query(query)
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]);
            let resp = self.send(req).await?;
            let next = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let bytes = resp.bytes().await?;
            let batch: Vec<T> = serde_json::from_slice(&bytes)?;
            debug!(url, page, count = batch.len(), "fetched page");
            out.extend(batch);
            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }
        Ok(out)
    }

    async fn put_issue(&self, iid: u64, body: Value) -> TrackerResult<()> {
        self.send(
            self.client
                .put(self.project_url(&format!("/issues/{iid}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

/// GitLab reports errors as `{"message": ..}` or `{"error": ..}`, where the
/// message may itself be an object of field errors.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(v) => match v.get("message").or_else(|| v.get("error")) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        Err(_) => body.chars().take(200).collect(),
    }
}

#[derive(Deserialize)]
struct GlProject {
    name_with_namespace: String,
}

#[derive(Deserialize)]
struct GlUser {
    id: u64,
    username: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct GlNamed {
    id: u64,
    title: String,
}

#[derive(Deserialize)]
struct GlIteration {
    id: u64,
    start_date: NaiveDate,
}

#[derive(Deserialize)]
struct GlIssue {
    id: u64,
    iid: u64,
    title: String,
    description: Option<String>,
    state: String,
    weight: Option<u32>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignees: Vec<GlUser>,
    author: Option<GlUser>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    epic: Option<GlNamed>,
    milestone: Option<GlNamed>,
    iteration: Option<GlIteration>,
}

impl From<GlUser> for UserRef {
    fn from(u: GlUser) -> Self {
        UserRef {
            id: u.id,
            username: u.username,
            name: u.name,
        }
    }
}

impl From<GlNamed> for RelationRef {
    fn from(n: GlNamed) -> Self {
        RelationRef {
            id: n.id,
            title: n.title,
        }
    }
}

impl From<GlIssue> for WorkItem {
    fn from(issue: GlIssue) -> Self {
        WorkItem {
            id: issue.id,
            iid: issue.iid,
            title: issue.title,
            description: issue.description.filter(|d| !d.is_empty()),
            state: ItemState::parse(&issue.state).unwrap_or(ItemState::Opened),
            weight: issue.weight,
            labels: issue.labels,
            assignees: issue.assignees.into_iter().map(UserRef::from).collect(),
            author: issue.author.map(UserRef::from),
            created_at: issue.created_at,
            closed_at: issue.closed_at,
            epic: issue.epic.map(RelationRef::from),
            milestone: issue.milestone.map(RelationRef::from),
            iteration: issue.iteration.map(|i| IterationRef {
                id: i.id,
                start_date: i.start_date,
            }),
        }
    }
}

fn update_body(update: &ItemUpdate) -> Value {
    let mut body = Map::new();
    if let Some(title) = &update.title {
        body.insert("title".into(), json!(title));
    }
    if let Some(description) = &update.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(state) = update.state {
        let event = match state {
            ItemState::Opened => "reopen",
            ItemState::Closed => "close",
        };
        body.insert("state_event".into(), json!(event));
    }
    if let Some(weight) = update.weight {
        body.insert("weight".into(), json!(weight));
    }
    if let Some(labels) = &update.labels {
        body.insert("labels".into(), json!(labels.join(",")));
    }
    Value::Object(body)
}

fn create_body(item: &NewItem) -> Value {
    let mut body = Map::new();
    body.insert("title".into(), json!(item.title));
    if let Some(description) = &item.description {
        body.insert("description".into(), json!(description));
    }
    if !item.labels.is_empty() {
        body.insert("labels".into(), json!(item.labels.join(",")));
    }
    if let Some(weight) = item.weight {
        body.insert("weight".into(), json!(weight));
    }
    if let Some(epic_id) = item.epic_id {
        body.insert("epic_id".into(), json!(epic_id));
    }
    if let Some(milestone_id) = item.milestone_id {
        body.insert("milestone_id".into(), json!(milestone_id));
    }
    Value::Object(body)
}

#[async_trait]
impl Tracker for GitLabClient {
    fn name(&self) -> &str {
        "GitLab"
    }

    async fn get_item(&self, iid: u64) -> TrackerResult<WorkItem> {
        let issue: GlIssue = self
            .send(self.client.get(self.project_url(&format!("/issues/{iid}"))))
            .await?
            .json()
            .await?;
        Ok(issue.into())
    }

    async fn list_items(&self, filter: &ItemFilter) -> TrackerResult<Vec<WorkItem>> {
        let mut query = vec![("state", filter.state.as_str().to_string())];
        if !filter.labels.is_empty() {
            query.push(("labels", filter.labels.join(",")));
        }
        let issues: Vec<GlIssue> = self.get_all(&self.project_url("/issues"), &query).await?;
        Ok(issues.into_iter().map(WorkItem::from).collect())
    }

    async fn create_item(&self, item: &NewItem) -> TrackerResult<WorkItem> {
        let issue: GlIssue = self
            .send(
                self.client
                    .post(self.project_url("/issues"))
                    .json(&create_body(item)),
            )
            .await?
            .json()
            .await?;
        Ok(issue.into())
    }

    async fn save_item(&self, iid: u64, update: &ItemUpdate) -> TrackerResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.put_issue(iid, update_body(update)).await
    }

    async fn list_epics(&self) -> TrackerResult<Vec<RelationRef>> {
        let epics: Vec<GlNamed> = self.get_all(&self.group_url("/epics"), &[]).await?;
        Ok(epics.into_iter().map(RelationRef::from).collect())
    }

    async fn attach_epic(&self, item: &WorkItem, epic_id: u64) -> TrackerResult<()> {
        self.put_issue(item.iid, json!({ "epic_id": epic_id })).await
    }

    async fn clear_epic(&self, item: &WorkItem) -> TrackerResult<()> {
        self.put_issue(item.iid, json!({ "epic_id": 0 })).await
    }

    /// Project milestones together with those of every ancestor group, in
    /// any state.
    async fn list_milestones(&self) -> TrackerResult<Vec<RelationRef>> {
        let milestones: Vec<GlNamed> = self
            .get_all(
                &self.project_url("/milestones"),
                &[("include_ancestors", "true".to_string())],
            )
            .await?;
        Ok(milestones.into_iter().map(RelationRef::from).collect())
    }

    async fn attach_milestone(&self, item: &WorkItem, milestone_id: u64) -> TrackerResult<()> {
        self.put_issue(item.iid, json!({ "milestone_id": milestone_id }))
            .await
    }

    async fn clear_milestone(&self, item: &WorkItem) -> TrackerResult<()> {
        self.put_issue(item.iid, json!({ "milestone_id": 0 })).await
    }

    async fn list_iterations(&self) -> TrackerResult<Vec<IterationRef>> {
        let iterations: Vec<GlIteration> = self.get_all(&self.group_url("/iterations"), &[]).await?;
        Ok(iterations
            .into_iter()
            .map(|i| IterationRef {
                id: i.id,
                start_date: i.start_date,
            })
            .collect())
    }

    async fn log_time(&self, iid: u64, duration: &str) -> TrackerResult<()> {
        self.send(
            self.client
                .post(self.project_url(&format!("/issues/{iid}/add_spent_time")))
                .query(&[("duration", duration)]),
        )
        .await?;
        Ok(())
    }
}
