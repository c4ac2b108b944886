use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    /// An item deliberately dropped by a transform; sinks skip it and carry on.
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("sink error: {0}")]
    Sink(String),
}

impl PipelineError {
    /// Whether the run can continue past this item.
    pub fn is_item_level(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Transform(_))
    }
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::sync::Mutex;

    struct VecSource(Vec<i64>);

    #[async_trait::async_trait]
    impl Source<i64> for VecSource {
        async fn stream(
            &self,
        ) -> Pin<Box<dyn Stream<Item = Result<Envelope<i64>, PipelineError>> + Send>> {
            let items: Vec<_> = self.0.iter().copied().map(|v| Ok(Envelope::new(v))).collect();
            Box::pin(stream::iter(items))
        }
    }

    struct RejectOdd;

    #[async_trait::async_trait]
    impl Transform<i64, i64> for RejectOdd {
        async fn apply(&self, input: Envelope<i64>) -> Result<Envelope<i64>, PipelineError> {
            if input.payload % 2 == 0 {
                Ok(input)
            } else {
                Err(PipelineError::Rejected(format!("{} is odd", input.payload)))
            }
        }
    }

    #[derive(Clone, Default)]
    struct CollectSink(Arc<Mutex<Vec<i64>>>);

    #[async_trait::async_trait]
    impl Sink<i64> for CollectSink {
        async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
        where
            S: Stream<Item = Result<Envelope<i64>, PipelineError>> + Send + Unpin + 'static,
        {
            while let Some(item) = input.next().await {
                match item {
                    Ok(env) => self.0.lock().await.push(env.payload),
                    Err(e) if e.is_item_level() => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn transforms_run_between_source_and_sink() {
        let sink = CollectSink::default();
        let collected = sink.0.clone();

        let pipeline: Pipeline<_, i64, _> = Pipeline {
            source: VecSource(vec![1, 2, 3, 4]),
            transforms: vec![Arc::new(RejectOdd)],
            sink,
        };
        pipeline.run().await.expect("pipeline");

        assert_eq!(*collected.lock().await, vec![2, 4]);
    }

    #[test]
    fn only_item_errors_are_recoverable() {
        assert!(PipelineError::Rejected("x".into()).is_item_level());
        assert!(PipelineError::Transform("x".into()).is_item_level());
        assert!(!PipelineError::Source("x".into()).is_item_level());
        assert!(!PipelineError::Sink("x".into()).is_item_level());
    }
}
