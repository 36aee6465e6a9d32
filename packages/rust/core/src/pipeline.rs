//! End-to-end `build` pipeline: recipe → prefetch → metadata → document → `.bes` file.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::task::spawn_blocking;
use tracing::{Span, info, instrument};

use besengine_shared::{ActionCollection, BesEngineError, Recipe, Result};

use crate::action::wrap_scripts;
use crate::document::{OutputDocument, build_document, output_path};
use crate::metadata::{BuildContext, SelfServiceConfig, TaskMetadata, prefetch_file_name};
use crate::probe::{file_size, prefetch_statement, probe};
use crate::relevance::validator_for;

/// Network collaborators the build depends on.
pub trait TaskSources {
    /// Follow the download link once and return its direct location.
    fn resolve_url(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    /// Fetch an icon and return it as a `data:` URI.
    fn fetch_icon(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Settings for a build that come from configuration rather than the recipe.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory the `.bes` file is written to.
    pub cache_dir: PathBuf,
    /// Category used when the recipe has none.
    pub default_category: String,
    /// QnA evaluator location; validation is skipped when it does not exist.
    pub qna_path: PathBuf,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Path of the written `.bes` file.
    pub bes_file: PathBuf,
    pub title: String,
    /// Direct download URL used in the prefetch.
    pub download_url: String,
    pub prefetch: String,
    /// Number of action elements, self-service copy included.
    pub action_count: usize,
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the build completes.
    fn done(&self, result: &BuildResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &BuildResult) {}
}

/// Run the full build.
///
/// 1. Validate actions
/// 2. Resolve the direct download URL
/// 3. Hash the installer and compose the prefetch
/// 4. Wrap every action script
/// 5. Fetch the icon (self-service only) and resolve metadata
/// 6. Assemble and write the document
#[instrument(skip_all, fields(name = %recipe.name, version = %recipe.version))]
pub async fn build_task(
    recipe: &Recipe,
    options: &BuildOptions,
    ctx: &BuildContext,
    sources: &impl TaskSources,
    progress: &dyn ProgressReporter,
) -> Result<BuildResult> {
    let mut actions = if recipe.actions.is_empty() {
        ActionCollection::single_default()
    } else {
        ActionCollection::from_entries(recipe.actions.clone())?
    };

    progress.phase("Resolving download URL");
    let source_url = recipe.override_url.as_deref().unwrap_or(&recipe.url);
    let download_url = sources.resolve_url(source_url).await?;
    info!(%download_url, "resolved download URL");

    progress.phase("Hashing installer");
    let installer = Path::new(&recipe.installer);
    let prefetch = match &recipe.prefetch {
        Some(prefetch) => prefetch.clone(),
        None => {
            let digest = probe(installer)?;
            let file_name = prefetch_file_name(recipe, &download_url);
            prefetch_statement(&file_name, &digest, &download_url)
        }
    };
    let download_size = file_size(installer)?;

    wrap_scripts(
        &mut actions,
        recipe.pre_action_script.as_deref().unwrap_or(""),
        &prefetch,
        recipe.post_action_script.as_deref().unwrap_or(""),
    );

    let icon = match (&recipe.icon, recipe.self_service) {
        (Some(icon_url), true) => {
            progress.phase("Fetching icon");
            Some(sources.fetch_icon(icon_url).await?)
        }
        _ => None,
    };

    let meta = TaskMetadata::resolve(recipe, &options.default_category, download_size, icon, ctx);
    let self_service = SelfServiceConfig::resolve(recipe);

    progress.phase("Assembling task");
    info!(title = %meta.title, "building BES task");
    let validator = validator_for(&options.qna_path);
    // Relevance checks spawn one evaluator process per line.
    let span = Span::current();
    let (root, meta) = spawn_blocking(move || {
        let _entered = span.enter();
        let root = build_document(&meta, &actions, self_service.as_ref(), validator.as_ref());
        (root, meta)
    })
    .await
    .map_err(|e| match e.try_into_panic() {
        Ok(panic) => std::panic::resume_unwind(panic),
        Err(e) => BesEngineError::validation(format!("task assembly did not complete: {e}")),
    })?;

    let action_count = root
        .child("Task")
        .map(|task| {
            task.children()
                .iter()
                .filter(|c| c.child("ActionScript").is_some())
                .count()
        })
        .unwrap_or(0);

    let document = OutputDocument {
        root,
        path: output_path(&options.cache_dir, &recipe.name, &recipe.version),
    };

    progress.phase("Writing BES file");
    document.write()?;

    let result = BuildResult {
        bes_file: document.path,
        title: meta.title,
        download_url,
        prefetch,
        action_count,
    };
    progress.done(&result);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use besengine_shared::{ActionEntry, BesEngineError};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::testutil::parse;

    struct FixedSources;

    impl TaskSources for FixedSources {
        async fn resolve_url(&self, _url: &str) -> Result<String> {
            Ok("https://cdn.example.com/pub/Firefox 130.0.dmg".into())
        }

        async fn fetch_icon(&self, _url: &str) -> Result<String> {
            Ok("data:image/png;base64,iVBORw0KGgo=".into())
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "besengine-pipeline-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ctx() -> BuildContext {
        BuildContext {
            now: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            user: "packager".into(),
            tool_version: "0.1.0".into(),
            host_version: None,
        }
    }

    fn options(dir: &Path) -> BuildOptions {
        BuildOptions {
            cache_dir: dir.join("cache"),
            default_category: "Software Deployment".into(),
            qna_path: PathBuf::from("/nonexistent/besengine/QnA"),
        }
    }

    fn entry(key: u32, name: &str, number: &str, script: &str) -> ActionEntry {
        ActionEntry {
            key,
            action_name: Some(name.into()),
            action_number: Some(number.into()),
            action_script: Some(script.into()),
            ..Default::default()
        }
    }

    fn recipe(dir: &Path) -> Recipe {
        let installer = dir.join("Firefox.dmg");
        std::fs::write(&installer, b"abc").unwrap();
        Recipe {
            name: "Firefox".into(),
            version: "130.0".into(),
            url: "https://download.example.com/?product=firefox-latest".into(),
            installer: installer.to_string_lossy().into_owned(),
            relevance: vec!["mac of operating system".into()],
            actions: vec![
                entry(2, "Action2", "Action2", "\nrun user"),
                entry(1, "DefaultAction", "Action1", "\nrun install"),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn build_writes_complete_task() {
        let tmp = temp_dir();
        let mut r = recipe(&tmp);
        r.self_service = true;
        r.self_service_action = Some("Action2".into());
        r.icon = Some("https://icons.example.com/firefox.png".into());

        let result = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap();

        assert!(result.bes_file.ends_with("cache/Deploy Firefox 130.0.bes"));
        assert_eq!(result.action_count, 3);
        assert_eq!(
            result.prefetch,
            "prefetch Firefox_130.0.dmg sha1:a9993e364706816aba3e25717850c26c9cd0d89d size:3 \
             https://cdn.example.com/pub/Firefox 130.0.dmg \
             sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let doc = parse(&std::fs::read_to_string(&result.bes_file).unwrap());
        let task = doc.child("Task").unwrap();
        assert_eq!(task.child_text("Title"), "Deploy Firefox 130.0");
        assert_eq!(task.child_text("DownloadSize"), "3");
        assert_eq!(task.child_text("Source"), "besengine v0.1.0");
        assert_eq!(task.child_text("SourceID"), "packager");

        let ui = task
            .children
            .iter()
            .find(|c| c.name == "MIMEField" && c.child_text("Name") == "action-ui-metadata")
            .expect("ui metadata");
        assert_eq!(
            ui.child_text("Value"),
            r#"{"version": "130.0","size": "3","icon": "data:image/png;base64,iVBORw0KGgo="}"#
        );

        let default = task.child("DefaultAction").unwrap();
        assert_eq!(
            default.child_text("ActionScript"),
            format!("{}\nrun install", result.prefetch)
        );

        let offer = task.children.last().unwrap();
        assert_eq!(offer.attr("ID"), Some("Action10"));
        assert_eq!(
            offer.child_text("ActionScript"),
            format!("{}\nrun user", result.prefetch)
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn supplied_prefetch_is_used_verbatim() {
        let tmp = temp_dir();
        let mut r = recipe(&tmp);
        r.prefetch = Some("prefetch uploaded sha1:1 size:3 http://bes/Uploads/1 sha256:2".into());
        r.actions = vec![];
        r.post_action_script = Some("delete __Download/uploaded".into());

        let result = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(result.action_count, 1);

        let doc = parse(&std::fs::read_to_string(&result.bes_file).unwrap());
        let default = doc.child("Task").unwrap().child("DefaultAction").unwrap();
        assert_eq!(default.attr("ID"), Some("Action1"));
        assert_eq!(
            default.child_text("ActionScript"),
            "prefetch uploaded sha1:1 size:3 http://bes/Uploads/1 sha256:2\ndelete __Download/uploaded"
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn identical_inputs_build_identical_files() {
        let tmp = temp_dir();
        let r = recipe(&tmp);

        let first = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap();
        let bytes_one = std::fs::read(&first.bes_file).unwrap();

        let second = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap();
        let bytes_two = std::fs::read(&second.bes_file).unwrap();

        assert_eq!(bytes_one, bytes_two);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_installer_fails_without_output() {
        let tmp = temp_dir();
        let mut r = recipe(&tmp);
        r.installer = tmp.join("missing.dmg").to_string_lossy().into_owned();

        let err = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BesEngineError::FileNotFound { .. }));
        assert!(!options(&tmp).cache_dir.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn malformed_action_fails_before_build() {
        let tmp = temp_dir();
        let mut r = recipe(&tmp);
        r.actions.push(ActionEntry {
            key: 3,
            action_name: Some("Action".into()),
            action_number: None,
            action_script: Some(String::new()),
            ..Default::default()
        });

        let err = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BesEngineError::MalformedAction { .. }));
        assert!(!options(&tmp).cache_dir.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn script_that_cannot_be_serialized_fails_without_output() {
        let tmp = temp_dir();
        let mut r = recipe(&tmp);
        r.actions = vec![entry(1, "DefaultAction", "Action1", "\nprintf '\x1b[31mred\x1b[0m'")];

        let err = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BesEngineError::Validation { .. }));
        assert!(!options(&tmp).cache_dir.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn action_name_with_space_is_malformed() {
        let tmp = temp_dir();
        let mut r = recipe(&tmp);
        r.actions.push(entry(3, "Install App", "Action3", "run"));

        let err = build_task(&r, &options(&tmp), &ctx(), &FixedSources, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BesEngineError::MalformedAction { .. }));
        assert!(!options(&tmp).cache_dir.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
