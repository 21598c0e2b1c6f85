use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::compute::{ComputeOutput, ProviderError, RemoteStatus};
use crate::jobs::{
    JobError, JobOrchestrator, JobQueryError, JobRegistry, JobState, OrchestratorError,
};
use crate::matching::{HospitalSource, StaticHospitalSource};

#[tokio::test(start_paused = true)]
async fn job_polls_until_success_and_ranks_backend_scores() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(RemoteStatus::Queued),
        Ok(RemoteStatus::Running),
        Ok(RemoteStatus::Succeeded),
    ]));
    let orchestrator = orchestrator(Arc::clone(&provider), 10);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    let job = orchestrator.wait(&job_id).await.expect("job recorded");

    assert_eq!(job.state(), JobState::Succeeded);
    assert_eq!(job.attempts(), 2);
    assert_eq!(provider.polls(), 3);
    assert_eq!(provider.fetch_calls.load(Ordering::SeqCst), 1);

    let outcome = orchestrator.job_result(&job_id).expect("result ready");
    assert_eq!(
        outcome.best_hospital_id.as_deref(),
        Some("spital_urgenta_bucuresti")
    );
    assert_eq!(outcome.rankings[0].hospital_id, "spital_urgenta_bucuresti");
    assert_eq!(outcome.rankings[1].reasoning, "Distance: 324.2km");
}

#[tokio::test(start_paused = true)]
async fn submission_rejection_fails_job_without_polling() {
    let provider = Arc::new(ScriptedProvider::rejecting_submit(ProviderError::transient(
        "node busy",
    )));
    let orchestrator = orchestrator(Arc::clone(&provider), 10);

    let err = orchestrator
        .start_job(emergency())
        .await
        .expect_err("submission rejected");
    let OrchestratorError::Submission { job_id, source } = err else {
        panic!("expected submission error");
    };
    assert!(source.is_transient());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.submit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.polls(), 0);

    let job = orchestrator.job(&job_id).expect("job recorded");
    assert_eq!(job.state(), JobState::Failed);
    assert!(matches!(job.error(), Some(JobError::Submission { .. })));
    assert!(!orchestrator.cancel(&job_id));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_on_every_poll_end_timed_out() {
    let polls = (0..4)
        .map(|_| Err(ProviderError::transient("connection reset")))
        .collect();
    let provider = Arc::new(ScriptedProvider::new(polls));
    let orchestrator = orchestrator(Arc::clone(&provider), 4);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    let job = orchestrator.wait(&job_id).await.expect("job recorded");

    assert_eq!(job.state(), JobState::TimedOut);
    assert_eq!(job.attempts(), 4);
    assert_eq!(provider.polls(), 4);
    assert_eq!(job.error(), Some(&JobError::TimeoutExceeded { attempts: 4 }));

    let err = orchestrator.job_result(&job_id).expect_err("timed out");
    assert!(matches!(
        err,
        JobQueryError::JobFailed {
            state: JobState::TimedOut,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn backend_failure_on_first_poll_fails_immediately() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(RemoteStatus::Failed {
        reason: "algorithm crashed".into(),
    })]));
    let orchestrator = orchestrator(Arc::clone(&provider), 30);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    let job = orchestrator.wait(&job_id).await.expect("job recorded");

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.attempts(), 0);
    assert_eq!(provider.polls(), 1);
    assert_eq!(
        job.error(),
        Some(&JobError::BackendFailed {
            message: "algorithm crashed".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn fatal_poll_error_fails_job() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(RemoteStatus::Running),
        Err(ProviderError::fatal("status: HTTP 404 Not Found")),
    ]));
    let orchestrator = orchestrator(Arc::clone(&provider), 30);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    let job = orchestrator.wait(&job_id).await.expect("job recorded");

    assert_eq!(job.state(), JobState::Failed);
    match job.error() {
        Some(JobError::Provider { message }) => assert!(message.contains("HTTP 404")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_after_success_is_not_retried() {
    let provider = Arc::new(
        ScriptedProvider::new(vec![Ok(RemoteStatus::Succeeded)])
            .with_fetch(Err(ProviderError::transient("result download timed out"))),
    );
    let orchestrator = orchestrator(Arc::clone(&provider), 30);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    let job = orchestrator.wait(&job_id).await.expect("job recorded");

    assert_eq!(job.state(), JobState::Failed);
    assert!(matches!(job.error(), Some(JobError::ResultFetch { .. })));
    assert_eq!(provider.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hospital_snapshot_results_are_scored_locally() {
    let hospitals = StaticHospitalSource::bundled()
        .expect("bundled")
        .snapshot()
        .expect("snapshot");
    let provider = Arc::new(
        ScriptedProvider::new(vec![Ok(RemoteStatus::Succeeded)])
            .with_fetch(Ok(ComputeOutput::Snapshot(hospitals))),
    );
    let orchestrator = orchestrator(Arc::clone(&provider), 30);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    orchestrator.wait(&job_id).await.expect("job recorded");

    let outcome = orchestrator.job_result(&job_id).expect("result ready");
    assert_eq!(outcome.rankings.len(), 3);
    assert_eq!(
        outcome.best_hospital_id.as_deref(),
        Some("spital_urgenta_bucuresti")
    );
    assert_eq!(
        outcome.rankings.last().map(|r| r.hospital_id.as_str()),
        Some("spital_judetean_cluj")
    );
}

#[tokio::test(start_paused = true)]
async fn running_job_reports_not_ready_until_cancelled() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let orchestrator = orchestrator(Arc::clone(&provider), 1_000);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    tokio::time::sleep(Duration::from_secs(12)).await;

    let err = orchestrator.job_result(&job_id).expect_err("still running");
    assert!(matches!(err, JobQueryError::NotReady { .. }));

    assert!(orchestrator.cancel(&job_id));
    let job = orchestrator.wait(&job_id).await.expect("job recorded");
    assert_eq!(job.state(), JobState::Polling);
    assert!(job.attempts() >= 1);
    assert!(job.error().is_none());

    let polls_at_cancel = provider.polls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.polls(), polls_at_cancel);

    let status = orchestrator.job_status(&job_id).expect("known job");
    assert_eq!(status.state, JobState::Polling);
    assert_eq!(status.attempt_count, job.attempts());
}

#[tokio::test(start_paused = true)]
async fn emergency_is_forwarded_as_additional_input() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(RemoteStatus::Succeeded)]));
    let orchestrator = orchestrator(Arc::clone(&provider), 30);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    orchestrator.wait(&job_id).await;

    let request = provider
        .last_request
        .lock()
        .unwrap()
        .clone()
        .expect("request recorded");
    assert_eq!(request.extra_input["emergency"]["emergency_id"], "emergency-42");
    assert_eq!(request.extra_input["emergency"]["severity"], 7);
    assert_eq!(request.dataset, assets().dataset);
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let orchestrator = orchestrator(provider, 3);
    let id = crate::jobs::JobId("job-missing".into());

    assert!(matches!(
        orchestrator.job_status(&id),
        Err(JobQueryError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.job_result(&id),
        Err(JobQueryError::NotFound(_))
    ));
    assert!(orchestrator.wait(&id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stalled_backend_call_does_not_hold_up_other_jobs() {
    let orchestrator = JobOrchestrator::new(
        Arc::new(StalledFirstProvider::default()),
        Arc::new(JobRegistry::new()),
        assets(),
        policy(10),
    );

    let stalled = orchestrator.start_job(emergency()).await.expect("first submitted");
    let quick = orchestrator.start_job(emergency()).await.expect("second submitted");
    assert_eq!(orchestrator.active_loops(), 2);

    let job = orchestrator.wait(&quick).await.expect("job recorded");
    assert_eq!(job.state(), JobState::Succeeded);
    assert!(orchestrator.job_result(&quick).is_ok());

    let status = orchestrator.job_status(&stalled).expect("known job");
    assert_eq!(status.state, JobState::Polling);
    assert_eq!(status.attempt_count, 0);

    assert!(orchestrator.cancel(&stalled));
    let job = orchestrator.wait(&stalled).await.expect("job recorded");
    assert_eq!(job.state(), JobState::Polling);
    assert_eq!(orchestrator.active_loops(), 0);
}

#[tokio::test(start_paused = true)]
async fn finished_loops_cannot_be_cancelled() {
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(RemoteStatus::Succeeded)]));
    let orchestrator = orchestrator(Arc::clone(&provider), 10);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    orchestrator.wait(&job_id).await;

    assert!(!orchestrator.cancel(&job_id));
    assert_eq!(orchestrator.active_loops(), 0);
    assert_eq!(
        orchestrator.job(&job_id).map(|job| job.state()),
        Some(JobState::Succeeded)
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_cancel_reports_only_the_first() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let orchestrator = orchestrator(Arc::clone(&provider), 1_000);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    assert!(orchestrator.cancel(&job_id));
    assert!(!orchestrator.cancel(&job_id));
    orchestrator.wait(&job_id).await;
}

#[tokio::test(start_paused = true)]
async fn every_waiter_sees_the_final_state() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(RemoteStatus::Running),
        Ok(RemoteStatus::Running),
        Ok(RemoteStatus::Succeeded),
    ]));
    let orchestrator = orchestrator(Arc::clone(&provider), 10);

    let job_id = orchestrator.start_job(emergency()).await.expect("submitted");
    let (first, second) = tokio::join!(orchestrator.wait(&job_id), orchestrator.wait(&job_id));

    assert_eq!(first.map(|job| job.state()), Some(JobState::Succeeded));
    assert_eq!(second.map(|job| job.state()), Some(JobState::Succeeded));

    let again = orchestrator.wait(&job_id).await.expect("job recorded");
    assert_eq!(again.state(), JobState::Succeeded);
}
