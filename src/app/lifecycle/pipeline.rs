use anyhow::{Context, Error, bail};
use async_trait::async_trait;
use tracing::{Instrument, debug, info_span};

/// A startup or shutdown step that does no io worth awaiting
pub trait BlockingTask<C>: Send + Sync {
    fn run(&self, context: &C) -> Result<(), Error>;
}

#[async_trait]
pub trait AsyncTask<C>: Send + Sync {
    async fn run(&self, context: &C) -> Result<(), Error>;
}

enum Step<C> {
    Blocking(Box<dyn BlockingTask<C>>),
    Async(Box<dyn AsyncTask<C>>),
}

/// Named steps run in order, stopping at the first failure
pub struct Pipeline<C> {
    name: &'static str,
    steps: Vec<(&'static str, Step<C>)>,
}

impl<C: Sync> Pipeline<C> {
    pub async fn run(&self, context: &C) -> Result<(), Error> {
        let span = info_span!("pipeline", name = self.name);

        async {
            for (name, step) in &self.steps {
                debug!("Running {}", name);

                let result = match step {
                    Step::Blocking(task) => task.run(context),
                    Step::Async(task) => task.run(context).await,
                };

                result.with_context(|| format!("{} failed at {}", self.name, name))?;
            }

            Ok(())
        }
        .instrument(span)
        .await
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

pub struct PipelineBuilder<C> {
    name: &'static str,
    steps: Vec<(&'static str, Step<C>)>,
}

impl<C: Sync> PipelineBuilder<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn with_blocking(mut self, name: &'static str, task: Box<dyn BlockingTask<C>>) -> Self {
        self.steps.push((name, Step::Blocking(task)));
        self
    }

    pub fn with_async(mut self, name: &'static str, task: Box<dyn AsyncTask<C>>) -> Self {
        self.steps.push((name, Step::Async(task)));
        self
    }

    pub fn build(self) -> Result<Pipeline<C>, Error> {
        if self.steps.is_empty() {
            bail!("{} pipeline has no tasks", self.name);
        }

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
        })
    }
}
