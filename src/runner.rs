//! FormRunner: executes one claimed job against the external driver.
//!
//! Per job: navigate (fatal on failure), analyze the form through the model
//! service (fatal on failure), then fill fields in analysis order, upload
//! files, optionally verify visually, and click submit. Field-level trouble
//! is absorbed into the outcome list; one Interaction row is recorded per
//! attempted action.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use formpilot_core_types::{
    ActionKind, CompletionCheck, ElementDescriptor, FieldOutcome, Interaction, Job, JobResult,
};
use formpilot_dispatcher::{ExecuteError, JobExecutor};
use formpilot_driver::{BrowserDriver, ModelService, PageSnapshot, WaitPolicy};
use formpilot_element_locator::{AdaptiveResolver, ElementResolver, ResolverConfig};
use formpilot_job_store::JobStore;
use formpilot_learning_store::LearningStore;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub navigation_timeout: Duration,
    pub navigation_wait: WaitPolicy,
    pub resolver: ResolverConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            navigation_wait: WaitPolicy::NetworkIdle,
            resolver: ResolverConfig::default(),
        }
    }
}

pub struct FormRunner {
    driver: Arc<dyn BrowserDriver>,
    model: Arc<dyn ModelService>,
    store: Arc<dyn JobStore>,
    patterns: Arc<dyn LearningStore>,
    config: RunnerConfig,
}

impl FormRunner {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        model: Arc<dyn ModelService>,
        store: Arc<dyn JobStore>,
        patterns: Arc<dyn LearningStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            driver,
            model,
            store,
            patterns,
            config,
        }
    }

    /// Resolve and act on one field. Resolution failure is recorded and
    /// absorbed; only store unavailability propagates.
    async fn run_field(
        &self,
        resolver: &AdaptiveResolver,
        job: &Job,
        descriptor: &ElementDescriptor,
        action: ActionKind,
        value: Option<&str>,
    ) -> Result<FieldOutcome, ExecuteError> {
        let resolve_started = Instant::now();
        let resolution = match resolver
            .resolve(self.driver.as_ref(), descriptor, action)
            .await
        {
            Ok(resolution) => resolution,
            Err(err) => {
                self.store
                    .append_interaction(Interaction::failure(
                        job.id.clone(),
                        action,
                        descriptor.selector.clone(),
                        descriptor.element_type.clone(),
                        None,
                        resolve_started.elapsed().as_millis() as u64,
                        err.to_string(),
                    ))
                    .await?;
                warn!(job = %job.id, field = %descriptor.name, error = %err, "field unresolved");
                return Ok(FieldOutcome::failed(
                    &descriptor.name,
                    descriptor.required,
                    None,
                    1,
                    err.to_string(),
                ));
            }
        };

        let attempts_allowed = job.config.max_retries + 1;
        let mut attempts = 0;
        let mut last_error = String::new();
        while attempts < attempts_allowed {
            attempts += 1;
            let act_started = Instant::now();
            match self.driver.act(&resolution.handle, action, value).await {
                Ok(()) => {
                    self.store
                        .append_interaction(Interaction::success(
                            job.id.clone(),
                            action,
                            resolution.selector.clone(),
                            descriptor.element_type.clone(),
                            resolution.strategy,
                            act_started.elapsed().as_millis() as u64,
                        ))
                        .await?;
                    debug!(
                        job = %job.id,
                        field = %descriptor.name,
                        attempt = attempts,
                        strategy = resolution.strategy.name(),
                        "action succeeded"
                    );
                    return Ok(FieldOutcome::succeeded(
                        &descriptor.name,
                        descriptor.required,
                        resolution.strategy,
                        attempts,
                    ));
                }
                Err(err) => {
                    last_error = err.to_string();
                    self.store
                        .append_interaction(Interaction::failure(
                            job.id.clone(),
                            action,
                            resolution.selector.clone(),
                            descriptor.element_type.clone(),
                            Some(resolution.strategy),
                            act_started.elapsed().as_millis() as u64,
                            last_error.clone(),
                        ))
                        .await?;
                    if !err.is_retryable() {
                        break;
                    }
                    debug!(
                        job = %job.id,
                        field = %descriptor.name,
                        attempt = attempts,
                        error = %last_error,
                        "action failed; retrying"
                    );
                }
            }
        }
        Ok(FieldOutcome::failed(
            &descriptor.name,
            descriptor.required,
            Some(resolution.strategy),
            attempts,
            last_error,
        ))
    }

    /// Model-backed completion check; unavailable is never fatal.
    async fn verify(&self, job: &Job) -> Option<CompletionCheck> {
        let screenshot = match self.driver.screenshot().await {
            Ok(screenshot) => screenshot,
            Err(err) => {
                warn!(job = %job.id, error = %err, "verification screenshot failed");
                return None;
            }
        };
        match self.model.verify_completion(&screenshot).await {
            Ok(check) => {
                info!(
                    job = %job.id,
                    completed = check.completed,
                    ready = check.ready_for_submission,
                    "visual verification"
                );
                Some(check)
            }
            Err(err) => {
                warn!(job = %job.id, error = %err, "visual verification unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl JobExecutor for FormRunner {
    async fn execute(&self, job: &Job) -> Result<JobResult, ExecuteError> {
        self.driver
            .navigate(
                &job.url,
                self.config.navigation_wait,
                self.config.navigation_timeout,
            )
            .await?;

        let snapshot = PageSnapshot {
            url: self.driver.current_url().await?,
            screenshot: self.driver.screenshot().await?,
        };
        let analysis = self.model.analyze_structure(&snapshot).await?;
        info!(
            job = %job.id,
            fields = analysis.fields.len(),
            uploads = analysis.file_uploads.len(),
            "form analyzed"
        );

        let mut resolver_config = self.config.resolver.clone();
        resolver_config.confidence_threshold = job.config.confidence_threshold;
        let resolver = AdaptiveResolver::for_mode(
            job.config.strategy_mode,
            job.config.self_healing,
            Arc::clone(&self.patterns),
            Arc::clone(&self.model),
            &resolver_config,
        );

        let mut outcomes = Vec::new();
        for descriptor in &analysis.fields {
            let Some(value) = job.fields.get(&descriptor.name) else {
                debug!(job = %job.id, field = %descriptor.name, "no value supplied; skipping");
                continue;
            };
            outcomes.push(
                self.run_field(
                    &resolver,
                    job,
                    descriptor,
                    ActionKind::Fill,
                    Some(value.as_str()),
                )
                .await?,
            );
        }

        for descriptor in &analysis.file_uploads {
            let Some(file) = job.files.iter().find(|f| f.field == descriptor.name) else {
                continue;
            };
            outcomes.push(
                self.run_field(
                    &resolver,
                    job,
                    descriptor,
                    ActionKind::Upload,
                    Some(file.path.as_str()),
                )
                .await?,
            );
        }

        let verification = if job.config.visual_verification {
            self.verify(job).await
        } else {
            None
        };

        let submit = match &analysis.submit {
            Some(descriptor) => Some(
                self.run_field(&resolver, job, descriptor, ActionKind::Click, None)
                    .await?,
            ),
            None => None,
        };

        let success = outcomes.iter().all(|outcome| !outcome.blocking)
            && submit.as_ref().map_or(true, |s| s.success);
        Ok(JobResult {
            success,
            field_outcomes: outcomes,
            submit,
            verification,
            error: None,
        })
    }
}
