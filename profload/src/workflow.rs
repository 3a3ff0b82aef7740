//! The profile CRUD verification cycle.
//!
//! One call to [`ProfileWorkflow::run_cycle`] walks a profile through
//! create → read → delete → verify-gone and records one [`RequestMetric`] per
//! request. Every step runs regardless of how the previous one went; a failed
//! step only sets the failure message on its own metric.
use std::time::Instant;

use serde_json::Value;

use crate::{
    client::{ApiRequest, ApiResponse, HttpClient},
    error::{Error, Result},
    metric::{CycleMetric, RequestMetric},
    profile::{ProfileRequest, ProfileResponse},
};

/// Resource path, and the name every request is reported under.
pub const PROFILES: &str = "/profiles";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Create,
    Read,
    Page,
    Delete,
    VerifyGone,
}

impl Step {
    /// Status that makes the step pass.
    pub fn expected_status(&self) -> u16 {
        match self {
            Step::Create => 201,
            Step::Read | Step::Page => 200,
            Step::Delete => 204,
            Step::VerifyGone => 404,
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Step::Create => "Profile not created",
            Step::Read => "Profile not found",
            Step::Page => "Profiles page not retrieved",
            Step::Delete => "Profile not deleted",
            Step::VerifyGone => "Found deleted profile",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProfileWorkflow {
    payload: Value,
    page_check: bool,
}

impl Default for ProfileWorkflow {
    fn default() -> Self {
        Self::new(ProfileRequest::default().to_value())
    }
}

impl ProfileWorkflow {
    /// Workflow that creates profiles from `payload`.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            page_check: false,
        }
    }

    /// Also fetch the profile page between read and delete.
    pub fn with_page_check(mut self, enabled: bool) -> Self {
        self.page_check = enabled;
        self
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Run one cycle. Faults that abort the cycle are stored in
    /// [`CycleMetric::error`] together with the requests made so far.
    pub async fn run_cycle<C: HttpClient + ?Sized>(&self, client: &C) -> CycleMetric {
        let mut cycle = CycleMetric::default();
        if let Err(e) = self.execute(client, &mut cycle).await {
            tracing::warn!("Cycle aborted: {e}");
            cycle.error = Some(e.to_string());
        }
        cycle
    }

    async fn execute<C: HttpClient + ?Sized>(
        &self,
        client: &C,
        cycle: &mut CycleMetric,
    ) -> Result<()> {
        // Stays the submitted payload unless the create succeeds
        let mut profile = ProfileResponse(self.payload.clone());
        let mut created = false;

        let create = ApiRequest::post(PROFILES, self.payload.clone());
        let (res, mut metric) = call(client, Step::Create, create).await;
        if res.status == Step::Create.expected_status() {
            match res.json::<Value>() {
                Ok(body) => {
                    profile = body.into();
                    created = true;
                }
                Err(e) => {
                    cycle.push(metric);
                    return Err(e);
                }
            }
        } else {
            fail(Step::Create, &mut metric);
        }
        cycle.push(metric);

        let id = profile
            .id()
            .ok_or_else(|| Error::MissingProfileId(profile.0.to_string()))?;
        if !created {
            tracing::warn!("Create failed, continuing with id '{id}' from the submitted payload");
        }
        let path = format!("{PROFILES}/{id}");

        let (res, mut metric) = call(client, Step::Read, ApiRequest::get(&path)).await;
        let found = res.status == Step::Read.expected_status()
            && match res.json::<Value>() {
                Ok(body) => body == profile.0,
                Err(e) => {
                    fail(Step::Read, &mut metric);
                    cycle.push(metric);
                    return Err(e);
                }
            };
        if !found {
            fail(Step::Read, &mut metric);
        }
        cycle.push(metric);

        if self.page_check {
            let (res, metric) = call(client, Step::Page, ApiRequest::get(PROFILES)).await;
            cycle.push(expect(Step::Page, &res, metric));
        }

        let (res, metric) = call(client, Step::Delete, ApiRequest::delete(&path)).await;
        cycle.push(expect(Step::Delete, &res, metric));

        let (res, metric) = call(client, Step::VerifyGone, ApiRequest::get(&path)).await;
        cycle.push(expect(Step::VerifyGone, &res, metric));

        Ok(())
    }
}

/// Issue `request` for `step`, timing it. A transport failure yields a status
/// `0` response and fails the step with the transport error appended, without
/// aborting the cycle.
async fn call<C: HttpClient + ?Sized>(
    client: &C,
    step: Step,
    request: ApiRequest,
) -> (ApiResponse, RequestMetric) {
    let method = request.method;
    let start = Instant::now();
    let sent = client.send(request).await;
    let latency = start.elapsed();

    let (res, failure) = match sent {
        Ok(res) => (res, None),
        Err(e) => {
            tracing::warn!("{method} {PROFILES} failed: {e}");
            (
                ApiResponse::empty(0),
                Some(format!("{}: {e}", step.failure_message())),
            )
        }
    };
    let metric = RequestMetric {
        method,
        name: PROFILES.to_string(),
        status: res.status,
        latency,
        bytes: res.body.len(),
        failure,
    };
    (res, metric)
}

/// Mark `metric` as a failed `step`, keeping a more detailed message already
/// set by [`call`].
fn fail(step: Step, metric: &mut RequestMetric) {
    metric
        .failure
        .get_or_insert_with(|| step.failure_message().to_string());
}

/// Pass or fail `step` on the status code alone.
fn expect(step: Step, res: &ApiResponse, mut metric: RequestMetric) -> RequestMetric {
    if res.status != step.expected_status() {
        tracing::debug!(
            "{:?} expected {} got {}",
            step,
            step.expected_status(),
            res.status
        );
        fail(step, &mut metric);
    }
    metric
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::client::Method;

    /// Replays canned responses in order and records what was asked.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<ApiResponse>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<ApiResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(Method, String)> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| (r.method, r.path.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ApiResponse::empty(500)))
        }
    }

    fn stored() -> Value {
        json!({"id": "abc", "name": {"first": "Test"}})
    }

    fn refused() -> Result<ApiResponse> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[tokio::test]
    async fn happy_path_reports_no_failures_in_order() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::json_body(200, &stored())),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert!(cycle.is_clean(), "{cycle:?}");
        assert_eq!(
            client.requests(),
            vec![
                (Method::Post, "/profiles".to_string()),
                (Method::Get, "/profiles/abc".to_string()),
                (Method::Delete, "/profiles/abc".to_string()),
                (Method::Get, "/profiles/abc".to_string()),
            ]
        );
        assert!(cycle.requests.iter().all(|r| r.name == "/profiles"));
        let statuses: Vec<u16> = cycle.requests.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![201, 200, 204, 404]);
    }

    #[tokio::test]
    async fn create_sends_default_payload() {
        let client = ScriptedClient::new(vec![]);
        ProfileWorkflow::default().run_cycle(&client).await;

        let first = client.requests.lock().unwrap()[0].clone();
        assert_eq!(first.body, Some(json!({"name": {"first": "Test"}})));
    }

    #[tokio::test]
    async fn failed_create_without_id_aborts_after_recording_failure() {
        let client = ScriptedClient::new(vec![Ok(ApiResponse::json_body(
            400,
            &json!({"code": "bad_profile"}),
        ))]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.failures(), vec!["Profile not created"]);
        assert_eq!(cycle.requests.len(), 1);
        assert!(cycle.error.as_deref().unwrap().contains("profile has no id"));
    }

    #[tokio::test]
    async fn failed_create_continues_with_id_from_payload() {
        let payload = json!({"id": "fixed", "name": {"first": "Test"}});
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::empty(400)),
            Ok(ApiResponse::empty(404)),
            Ok(ApiResponse::empty(404)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::new(payload).run_cycle(&client).await;

        assert_eq!(cycle.error, None);
        assert_eq!(
            cycle.failures(),
            vec![
                "Profile not created",
                "Profile not found",
                "Profile not deleted"
            ]
        );
        let paths: Vec<String> = client.requests().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            paths,
            vec!["/profiles", "/profiles/fixed", "/profiles/fixed", "/profiles/fixed"]
        );
    }

    #[tokio::test]
    async fn read_with_different_body_is_not_found() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::json_body(
                200,
                &json!({"id": "abc", "name": {"first": "Other"}}),
            )),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.failures(), vec!["Profile not found"]);
        assert_eq!(cycle.requests[1].status, 200);
    }

    #[tokio::test]
    async fn read_with_unparsable_body_aborts_the_cycle() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::new(200, "<html>")),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.failures(), vec!["Profile not found"]);
        assert_eq!(cycle.requests.len(), 2);
        assert_eq!(client.requests().len(), 2);
        assert!(cycle.error.as_deref().unwrap().starts_with("invalid response body"));
    }

    #[tokio::test]
    async fn read_with_unparsable_error_body_is_not_found() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::new(500, "<html>")),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.failures(), vec!["Profile not found"]);
        assert_eq!(cycle.error, None);
        assert_eq!(cycle.requests.len(), 4);
    }

    #[tokio::test]
    async fn delete_answering_200_is_not_deleted() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::json_body(200, &stored())),
            Ok(ApiResponse::json_body(200, &stored())),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.failures(), vec!["Profile not deleted"]);
    }

    #[tokio::test]
    async fn profile_still_present_after_delete() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::json_body(200, &stored())),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::json_body(200, &stored())),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.failures(), vec!["Found deleted profile"]);
        assert_eq!(cycle.requests.len(), 4);
    }

    #[tokio::test]
    async fn every_step_runs_when_everything_fails() {
        let payload = json!({"id": "x", "name": {"first": "Test"}});
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::empty(500)),
            Ok(ApiResponse::empty(500)),
            Ok(ApiResponse::empty(500)),
            Ok(ApiResponse::empty(500)),
        ]);

        let cycle = ProfileWorkflow::new(payload).run_cycle(&client).await;

        assert_eq!(cycle.requests.len(), 4);
        assert_eq!(cycle.failures().len(), 4);
    }

    #[tokio::test]
    async fn created_body_that_is_not_json_aborts_the_cycle() {
        let client = ScriptedClient::new(vec![Ok(ApiResponse::new(201, "created"))]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(cycle.requests.len(), 1);
        assert!(cycle.requests[0].success());
        assert!(cycle.error.as_deref().unwrap().starts_with("invalid response body"));
    }

    #[tokio::test]
    async fn transport_failure_fails_the_step_and_continues() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            refused(),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default().run_cycle(&client).await;

        assert_eq!(
            cycle.failures(),
            vec!["Profile not found: IO error: connection refused"]
        );
        assert_eq!(cycle.requests[1].status, 0);
        assert_eq!(cycle.requests.len(), 4);
    }

    #[tokio::test]
    async fn page_check_runs_between_read_and_delete() {
        let client = ScriptedClient::new(vec![
            Ok(ApiResponse::json_body(201, &stored())),
            Ok(ApiResponse::json_body(200, &stored())),
            Ok(ApiResponse::empty(503)),
            Ok(ApiResponse::empty(204)),
            Ok(ApiResponse::empty(404)),
        ]);

        let cycle = ProfileWorkflow::default()
            .with_page_check(true)
            .run_cycle(&client)
            .await;

        assert_eq!(
            client.requests()[2],
            (Method::Get, "/profiles".to_string())
        );
        assert_eq!(cycle.failures(), vec!["Profiles page not retrieved"]);
        assert_eq!(cycle.requests.len(), 5);
    }
}
