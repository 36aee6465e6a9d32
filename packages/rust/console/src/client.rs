//! Authenticated client for the console REST API (`{root}/api/...`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use besengine_shared::{BesEngineError, ConsoleConfig, Result, console_password};

use crate::response::{
    TaskRecord, UploadResult, parse_import_response, parse_task_list, parse_upload_response,
};

const XML_CONTENT_TYPE: &str = "application/xml";

const USER_AGENT: &str = concat!("besengine/", env!("CARGO_PKG_VERSION"));

/// A task created by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTask {
    pub id: String,
    pub name: String,
    pub last_modified: Option<String>,
    pub site: String,
}

impl ImportedTask {
    pub fn summary(&self) -> ImportSummary {
        let data = BTreeMap::from([
            ("Task ID".to_string(), self.id.clone()),
            ("Task Name".to_string(), self.name.clone()),
            ("Site".to_string(), self.site.clone()),
        ]);
        ImportSummary {
            summary_text: "The following tasks were imported into BigFix:".into(),
            report_fields: vec!["Task ID".into(), "Task Name".into(), "Site".into()],
            data,
        }
    }
}

/// Report row for an imported task.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub summary_text: String,
    pub report_fields: Vec<String>,
    pub data: BTreeMap<String, String>,
}

/// Result of [`ConsoleClient::import_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// A task with the same title already exists in the site; nothing was posted.
    Duplicate(TaskRecord),
    Imported(ImportedTask),
}

/// Console REST API client.
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    client: Client,
    root: String,
    username: String,
    password: String,
}

impl ConsoleClient {
    /// Build a client from the `[console]` section, reading the password from its env var.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self> {
        let password = console_password(config)?;
        Self::new(config, password)
    }

    pub fn new(config: &ConsoleConfig, password: String) -> Result<Self> {
        let root = config.root_server.trim_end_matches('/').to_string();
        Url::parse(&root).map_err(|e| {
            BesEngineError::config(format!("invalid console.root_server {root:?}: {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BesEngineError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            root,
            username: config.username.clone(),
            password,
        })
    }

    /// `{root}/api/{path}`.
    fn api_url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/api/{path}", self.root);
        Url::parse(&raw).map_err(|e| BesEngineError::config(format!("invalid API URL {raw}: {e}")))
    }

    /// Upload a file to the console and return where it is hosted.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload(&self, path: &Path) -> Result<UploadResult> {
        let body = read_file(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BesEngineError::validation(format!("not a file: {}", path.display())))?;

        let url = self.api_url("upload")?;
        info!(%url, size = body.len(), "uploading to console");

        let response = self
            .client
            .post(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| BesEngineError::Network(format!("{url}: {e}")))?;

        let result = parse_upload_response(&success_body(response).await?)?;
        info!(name = %result.name, url = %result.url, "upload complete");
        Ok(result)
    }

    /// Tasks in a custom site.
    #[instrument(skip(self))]
    pub async fn site_tasks(&self, site: &str) -> Result<Vec<TaskRecord>> {
        let url = self.api_url(&format!("tasks/custom/{site}"))?;
        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| BesEngineError::Network(format!("{url}: {e}")))?;

        parse_task_list(&success_body(response).await?)
    }

    /// Import a `.bes` file into a custom site unless a task titled `title` exists.
    #[instrument(skip(self), fields(bes_file = %bes_file.display()))]
    pub async fn import_task(&self, bes_file: &Path, site: &str, title: &str) -> Result<ImportOutcome> {
        info!("searching site for existing task");
        let existing = self.site_tasks(site).await?;
        if let Some(task) = existing.into_iter().find(|t| t.name == title) {
            warn!(id = %task.id, last_modified = ?task.last_modified, "duplicate task, skipping import");
            return Ok(ImportOutcome::Duplicate(task));
        }

        let body = read_file(bes_file).await?;
        let url = self.api_url(&format!("tasks/custom/{site}"))?;
        info!(%url, "importing task");

        let response = self
            .client
            .post(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| BesEngineError::Network(format!("{url}: {e}")))?;

        let created = parse_import_response(&success_body(response).await?)?;
        info!(id = %created.id, name = %created.name, "task imported");

        Ok(ImportOutcome::Imported(ImportedTask {
            id: created.id,
            name: created.name,
            last_modified: created.last_modified,
            site: site.to_string(),
        }))
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| BesEngineError::io(path, e))
}

/// Body of a 2xx reply; anything else becomes [`BesEngineError::Console`].
async fn success_body(response: Response) -> Result<String> {
    let status = response.status();
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| BesEngineError::Network(format!("{url}: failed to read body: {e}")))?;

    if !status.is_success() {
        return Err(BesEngineError::Console {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    // base64("operator:secret")
    const AUTH: &str = "Basic b3BlcmF0b3I6c2VjcmV0";

    const LISTING: &str = r#"<BESAPI>
<Task Resource="x/101" LastModified="Fri, 08 Mar 2024 10:00:00 +0000"><Name>Deploy Firefox 129.0</Name><ID>101</ID></Task>
</BESAPI>"#;

    fn client(server: &MockServer) -> ConsoleClient {
        let config = ConsoleConfig {
            root_server: format!("{}/", server.uri()),
            username: "operator".into(),
            ..Default::default()
        };
        ConsoleClient::new(&config, "secret".into()).unwrap()
    }

    fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("besengine-console-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn upload_posts_file_with_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .and(header("authorization", AUTH))
            .and(header("content-disposition", "attachment; filename=\"upload-test.pkg\""))
            .and(body_string("installer bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<BESAPI><FileUpload><Name>upload-test.pkg</Name><URL>http://bes/Uploads/ab/upload-test.pkg.bfswd</URL>\
                 <Size>15</Size><SHA1>s1</SHA1><SHA256>s256</SHA256></FileUpload></BESAPI>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let file = temp_file("upload-test.pkg", "installer bytes");
        let result = client(&server).upload(&file).await.unwrap();
        assert_eq!(result.size, "15");
        assert_eq!(
            result.prefetch(None),
            "prefetch upload-test.pkg sha1:s1 size:15 http://bes/Uploads/ab/upload-test.pkg.bfswd sha256:s256"
        );
    }

    #[tokio::test]
    async fn rejected_credentials_surface_console_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Login failed.\n"))
            .mount(&server)
            .await;

        let file = temp_file("denied.pkg", "x");
        let err = client(&server).upload(&file).await.unwrap_err();
        match err {
            BesEngineError::Console { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Login failed.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn import_skips_duplicate_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks/custom/Mac"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let file = temp_file("dup.bes", "<BES/>");
        let outcome = client(&server)
            .import_task(&file, "Mac", "Deploy Firefox 129.0")
            .await
            .unwrap();
        match outcome {
            ImportOutcome::Duplicate(task) => assert_eq!(task.id, "101"),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn import_posts_new_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks/custom/Mac"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/tasks/custom/Mac"))
            .and(header("authorization", AUTH))
            .and(header("content-type", "application/xml"))
            .and(body_string("<BES/>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<BESAPI><Task Resource="x/102" LastModified="Sat, 09 Mar 2024 14:05:07 +0000"><Name>Deploy Firefox 130.0</Name><ID>102</ID></Task></BESAPI>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let file = temp_file("new.bes", "<BES/>");
        let outcome = client(&server)
            .import_task(&file, "Mac", "Deploy Firefox 130.0")
            .await
            .unwrap();

        let ImportOutcome::Imported(task) = outcome else {
            panic!("expected import");
        };
        assert_eq!(task.id, "102");
        assert_eq!(task.site, "Mac");
        assert_eq!(
            task.last_modified.as_deref(),
            Some("Sat, 09 Mar 2024 14:05:07 +0000")
        );

        let summary = serde_json::to_value(task.summary()).unwrap();
        assert_eq!(summary["data"]["Task ID"], "102");
        assert_eq!(summary["report_fields"][2], "Site");
    }

    #[test]
    fn invalid_root_server_is_config_error() {
        let config = ConsoleConfig {
            root_server: "not a url".into(),
            username: "operator".into(),
            ..Default::default()
        };
        let err = ConsoleClient::new(&config, "secret".into()).unwrap_err();
        assert!(matches!(err, BesEngineError::Config { .. }));
    }
}
