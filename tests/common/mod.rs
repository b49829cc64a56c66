#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use codegrade::auth::{Identity, Role, StaticIdentityResolver};
use codegrade::config::{Config, StoreBackend};
use codegrade::db::{ActivityFilter, ActivityLog, MemoryStore};
use codegrade::domain::{Activity, AnalysisOutcome, AnalysisResult, FileAnalysis, Score};
use codegrade::provider::{AnalysisProvider, AnalysisRequest, JobHandle, JobStatus, ProviderError};
use codegrade::services::upload::UploadRequest;
use codegrade::storage::LocalStorage;
use codegrade::AppState;

pub const STUDENT_TOKEN: &str = "student-token";
pub const OTHER_STUDENT_TOKEN: &str = "other-student-token";
pub const TUTOR_TOKEN: &str = "tutor-token";
pub const MANAGER_TOKEN: &str = "manager-token";

pub fn student() -> Identity {
    Identity::new("student-1", Role::Student)
}

pub fn other_student() -> Identity {
    Identity::new("student-2", Role::Student)
}

pub fn tutor() -> Identity {
    Identity::new("tutor-1", Role::Tutor)
}

pub fn manager() -> Identity {
    Identity::new("manager-1", Role::Manager)
}

/// Provider double: answers status calls from a script, then from a
/// fallback, and counts every call.
pub struct ScriptedProvider {
    pub submits: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub requests: Mutex<Vec<AnalysisRequest>>,
    fail_submit: AtomicBool,
    script: Mutex<VecDeque<JobStatus>>,
    fallback: Mutex<JobStatus>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            submits: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail_submit: AtomicBool::new(false),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(JobStatus::Running),
        })
    }

    pub fn finish_with(&self, outcome: AnalysisOutcome) {
        *self.fallback.lock().unwrap() = JobStatus::Finished(outcome);
    }

    pub fn complete_with_score(&self, score: u16) {
        self.finish_with(AnalysisOutcome::Completed {
            result: analysis_result(score),
        });
    }

    pub fn keep_running(&self) {
        *self.fallback.lock().unwrap() = JobStatus::Running;
    }

    pub fn push(&self, status: JobStatus) {
        self.script.lock().unwrap().push_back(status);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    fn source(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: AnalysisRequest) -> Result<JobHandle, ProviderError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 503,
                message: "analysis service unavailable".to_string(),
            });
        }
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        Ok(JobHandle {
            job_id: format!("job-{}", n),
        })
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        Ok(self.fallback.lock().unwrap().clone())
    }
}

pub fn analysis_result(score: u16) -> AnalysisResult {
    let mut categories = BTreeMap::new();
    categories.insert("reliability".to_string(), Score::new(score).unwrap());
    let mut metrics = BTreeMap::new();
    metrics.insert("bugs".to_string(), 2);
    metrics.insert("code_smells".to_string(), 7);

    AnalysisResult {
        score: Score::new(score).unwrap(),
        categories,
        metrics,
        feedback: "Consider splitting long functions.".to_string(),
        source: "scripted".to_string(),
        files: vec![FileAnalysis {
            path: "src/main.py".to_string(),
            score: Score::new(score).unwrap(),
            metrics: BTreeMap::new(),
            feedback: String::new(),
        }],
    }
}

pub struct TestContext {
    pub state: Arc<AppState>,
    pub provider: Arc<ScriptedProvider>,
    pub upload_dir: TempDir,
}

pub fn test_config(upload_dir: &TempDir) -> Config {
    Config {
        store_backend: StoreBackend::Memory,
        upload_folder: upload_dir.path().to_path_buf(),
        max_upload_bytes: 64 * 1024,
        poll_interval: Duration::from_millis(1),
        poll_max_attempts: 3,
        auto_poll: false,
        ..Config::default()
    }
}

pub fn test_context() -> TestContext {
    let upload_dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let store = Arc::new(MemoryStore::new());

    let identity = StaticIdentityResolver::new()
        .with_token(STUDENT_TOKEN, student())
        .with_token(OTHER_STUDENT_TOKEN, other_student())
        .with_token(TUTOR_TOKEN, tutor())
        .with_token(MANAGER_TOKEN, manager());

    let config = test_config(&upload_dir);
    let state = AppState {
        store: store.clone(),
        activities: store,
        provider: provider.clone(),
        identity: Arc::new(identity),
        storage: LocalStorage::new(config.upload_folder.clone()),
        config: Arc::new(config),
        startup_time: Utc::now(),
    };

    TestContext {
        state: Arc::new(state),
        provider,
        upload_dir,
    }
}

pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut data));
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    data
}

pub fn report_zip() -> Vec<u8> {
    build_zip(&[
        ("src/main.py", "def main():\n    print('report')\n"),
        ("src/util.py", "def helper():\n    return 42\n"),
    ])
}

pub fn zip_upload(project_id: &str, task_id: Option<&str>) -> UploadRequest {
    UploadRequest {
        filename: "report.zip".to_string(),
        payload: report_zip(),
        project_id: project_id.to_string(),
        task_id: task_id.map(str::to_string),
        owner_id: None,
    }
}

pub async fn activities_for(state: &AppState, id: &str) -> Vec<Activity> {
    state
        .activities
        .list(&ActivityFilter {
            submission_id: Some(id.to_string()),
            limit: None,
        })
        .await
        .unwrap()
}
