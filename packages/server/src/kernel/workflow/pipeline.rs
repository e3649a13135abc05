//! Typed pipeline: the engine's typed-result path for linear sequences.
//!
//! Workflows run over a homogeneous JSON map at the engine layer; inside a
//! node, multi-phase work composes as `Stage<I, O>` values so each stage's
//! output feeds the next stage's input directly, with no map in between.

use async_trait::async_trait;

use super::context::NodeContext;
use super::node::NodeError;

/// One typed stage of a pipeline.
#[async_trait]
pub trait Stage<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I, ctx: &NodeContext) -> Result<O, NodeError>;
}

/// Adapter turning an async closure into a stage.
pub struct StageFn<F>(F);

/// Lift a plain async function into a [`Stage`].
pub fn stage_fn<I, O, F, Fut>(f: F) -> StageFn<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<O, NodeError>> + Send,
{
    StageFn(f)
}

#[async_trait]
impl<I, O, F, Fut> Stage<I, O> for StageFn<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<O, NodeError>> + Send,
{
    async fn run(&self, input: I, _ctx: &NodeContext) -> Result<O, NodeError> {
        (self.0)(input).await
    }
}

/// A composed chain of stages, itself a stage.
pub struct Pipeline<I, O> {
    stage: Box<dyn Stage<I, O>>,
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(stage: impl Stage<I, O> + 'static) -> Self {
        Self {
            stage: Box::new(stage),
        }
    }

    /// Append a stage; the current output type becomes its input.
    pub fn then<Next, O2>(self, next: Next) -> Pipeline<I, O2>
    where
        Next: Stage<O, O2> + 'static,
        O2: Send + 'static,
    {
        Pipeline {
            stage: Box::new(Chain {
                first: self.stage,
                second: Box::new(next),
            }),
        }
    }

    pub async fn run(&self, input: I, ctx: &NodeContext) -> Result<O, NodeError> {
        self.stage.run(input, ctx).await
    }
}

struct Chain<I, M, O> {
    first: Box<dyn Stage<I, M>>,
    second: Box<dyn Stage<M, O>>,
}

#[async_trait]
impl<I, M, O> Stage<I, O> for Chain<I, M, O>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I, ctx: &NodeContext) -> Result<O, NodeError> {
        let mid = self.first.run(input, ctx).await?;
        self.second.run(mid, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::workflow::context::SharedState;
    use scanner::Platform;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx() -> NodeContext {
        NodeContext {
            job_id: Uuid::now_v7(),
            workflow_id: "wf".to_string(),
            node_id: "n".to_string(),
            config: Default::default(),
            params: serde_json::json!({}),
            platform: Platform::Ably,
            platform_config: None,
            shared: SharedState::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn stages_compose_in_order() {
        let pipeline = Pipeline::new(stage_fn(|n: u32| async move { Ok(n + 1) }))
            .then(stage_fn(|n: u32| async move { Ok(n * 10) }))
            .then(stage_fn(|n: u32| async move { Ok(format!("v{n}")) }));
        let out = pipeline.run(4, &ctx()).await.unwrap();
        assert_eq!(out, "v50");
    }

    #[tokio::test]
    async fn a_failing_stage_short_circuits() {
        let pipeline = Pipeline::new(stage_fn(|_: u32| async move {
            Err::<u32, _>(NodeError::internal("stage one down"))
        }))
        .then(stage_fn(|n: u32| async move {
            assert!(n == u32::MAX, "second stage must not run");
            Ok::<u32, NodeError>(n)
        }));
        let err = pipeline.run(1, &ctx()).await.unwrap_err();
        assert!(err.message.contains("stage one"));
    }
}
