//! Wires the profile workflow into a scenario and runs it.
use std::sync::Arc;

use crate::{
    Scenario,
    aggregate::WorkflowAggregate,
    client::{HttpClient, ReqwestClient},
    config::{LoadConfig, LoadModel},
    error::Result,
    executor::{RateExecutor, StopSignal, UserExecutor},
    workflow::ProfileWorkflow,
};

pub const SCENARIO_NAME: &str = "profile CRUD";

/// Run the configured load against the configured host. Triggering `stop`
/// ends the run early with the results gathered so far.
pub async fn run(config: &LoadConfig, stop: StopSignal) -> Result<WorkflowAggregate> {
    let client = ReqwestClient::new(&config.host, config.timeout)?;
    let workflow = ProfileWorkflow::new(config.payload.clone()).with_page_check(config.page_check);
    tracing::info!("Target host: {}", client.base_url());
    run_with(client, workflow, &config.model, stop).await
}

/// Run `workflow` through `client` under `model`.
///
/// The client is cloned into every iteration, so it must be a cheap handle
/// (`reqwest::Client` is reference counted).
pub async fn run_with<C>(
    client: C,
    workflow: ProfileWorkflow,
    model: &LoadModel,
    stop: StopSignal,
) -> Result<WorkflowAggregate>
where
    C: HttpClient + Clone + 'static,
{
    let workflow = Arc::new(workflow);
    let action = move || {
        let client = client.clone();
        let workflow = workflow.clone();
        async move { workflow.run_cycle(&client).await }
    };

    match model {
        LoadModel::Users {
            users,
            spawn_rate,
            run_time,
            wait_time,
        } => {
            let executor = UserExecutor::builder()
                .users(*users)
                .spawn_rate(*spawn_rate)
                .run_time(*run_time)
                .wait_time(*wait_time)
                .stop(stop)
                .build();
            Scenario::<WorkflowAggregate, _, _, _>::builder()
                .name(SCENARIO_NAME)
                .action(action)
                .executor(executor)
                .build()
                .run()
                .await
        }
        LoadModel::Rate { stages, workers } => {
            let executor = match workers {
                Some(workers) => RateExecutor::builder()
                    .stages(stages.clone())
                    .workers(*workers)
                    .stop(stop)
                    .build(),
                None => RateExecutor::builder()
                    .stages(stages.clone())
                    .stop(stop)
                    .build(),
            };
            Scenario::<WorkflowAggregate, _, _, _>::builder()
                .name(SCENARIO_NAME)
                .action(action)
                .executor(executor)
                .build()
                .run()
                .await
        }
    }
}
