use serde::Serialize;

use scaling::job::{JobProgress, JobSummary};

/// 命令响应。 未设置的字段不参与序列化：
///
/// ```json
/// {"success": true, "jobId": 1}
/// {"success": false, "reason": "Not support request!"}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct R {
    success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<Vec<JobSummary>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<JobProgress>,
}

impl Default for R {
    fn default() -> Self {
        R::success()
    }
}

impl R {
    pub fn success() -> Self {
        R {
            success: true,
            job_id: None,
            reason: None,
            jobs: None,
            progress: None,
        }
    }

    pub fn success_with_job_id(job_id: u64) -> Self {
        R {
            job_id: Some(job_id),
            ..R::success()
        }
    }

    pub fn with_jobs(jobs: Vec<JobSummary>) -> Self {
        R {
            jobs: Some(jobs),
            ..R::success()
        }
    }

    pub fn with_progress(progress: JobProgress) -> Self {
        R {
            progress: Some(progress),
            ..R::success()
        }
    }

    pub fn failure(reason: &str) -> Self {
        R {
            success: false,
            reason: Some(reason.to_string()),
            ..R::success()
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn job_id(&self) -> Option<u64> {
        self.job_id
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn jobs(&self) -> Option<&[JobSummary]> {
        self.jobs.as_deref()
    }

    pub fn progress(&self) -> Option<&JobProgress> {
        self.progress.as_ref()
    }
}
