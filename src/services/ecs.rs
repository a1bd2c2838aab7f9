//! Asynchronous compute jobs
//!
//! Long-running compute operations return a job id; the job is polled at
//! `/v1/{project_id}/jobs/{job_id}` until it reports `SUCCESS` or `FAIL`.

use crate::error::{Error, Result};
use crate::proxy::{Proxy, ResourceRef};
use crate::resource::{resource_type, Capabilities, Coercion, Field, ResourceType, Schema, Timestamp};
use crate::session::SessionRef;
use crate::wait::{self, DEFAULT_WAIT_INTERVAL};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use std::time::Duration;

pub const SERVICE_TYPE: &str = "ecs";

pub const JOB_SUCCESS: &str = "SUCCESS";

pub const JOB_FAILURES: &[&str] = &["FAIL"];

fn job_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("ecs.job", SERVICE_TYPE, "/v1/{project_id}/jobs")
            .allow(Capabilities {
                fetch: true,
                ..Capabilities::NONE
            })
            .fields(vec![
                Field::body("id", "job_id"),
                Field::body("begin_time", "begin_time").coerce(Coercion::Format(&Timestamp)),
                Field::body("end_time", "end_time").coerce(Coercion::Format(&Timestamp)),
                Field::body("entities", "entities").coerce(Coercion::Dict),
                Field::body("error_code", "error_code"),
                Field::body("fail_reason", "fail_reason"),
                Field::body("job_type", "job_type"),
                Field::body("status", "status"),
                Field::uri("project_id", "project_id"),
            ])
    })
}

resource_type!(
    /// A tracked asynchronous operation
    Job => job_schema
);

/// Compute jobs entry point
#[derive(Clone)]
pub struct EcsProxy {
    proxy: Proxy,
    project_id: Option<String>,
    wait_interval: Duration,
}

impl EcsProxy {
    pub fn new(session: SessionRef, project_id: Option<String>) -> Self {
        Self {
            proxy: Proxy::new(session),
            project_id,
            wait_interval: DEFAULT_WAIT_INTERVAL,
        }
    }

    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }

    /// A job stub scoped to the configured project
    fn job(&self, job_id: &str) -> Result<Job> {
        let Some(ref project_id) = self.project_id else {
            return Err(Error::Config(
                "project_id must be configured to query jobs".to_string(),
            ));
        };
        let mut attrs = Map::new();
        attrs.insert("id".to_string(), Value::String(job_id.to_string()));
        attrs.insert("project_id".to_string(), Value::String(project_id.clone()));
        Ok(Job::existing(attrs))
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let job = self.job(job_id)?;
        self.proxy.get(ResourceRef::Instance(job)).await
    }

    /// Poll a job until it succeeds; `FAIL` raises `ResourceFailure`
    pub async fn wait_for_job(&self, job_id: &str, timeout: Option<Duration>) -> Result<Job> {
        let mut job = self.job(job_id)?;
        wait::wait_for_status(
            self.proxy.session().as_ref(),
            &mut job,
            JOB_SUCCESS,
            Some(JOB_FAILURES),
            self.wait_interval,
            timeout,
        )
        .await?;
        Ok(job)
    }
}
