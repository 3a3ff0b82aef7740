use std::marker::PhantomData;

use typed_builder::TypedBuilder;

use crate::{aggregate::Aggregate, executor::Executor};

/// Glue between what is measured and how it is run.
///
/// `action` produces one metric per call, for the profile workflow one
/// [`crate::CycleMetric`] per create-read-delete-verify repetition. The
/// `executor` decides how many simulated users call it and for how long.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut>,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    pub executor: E,
    #[builder(default, setter(skip))]
    aggregate: PhantomData<A>,
}

impl<A, E, F, Fut> Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut>,
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    /// Run the scenario to completion and return the merged aggregate.
    pub async fn run(&self) -> Result<A, E::Error> {
        self.executor.exec(self).await
    }
}
