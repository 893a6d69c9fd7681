use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail};
use once_cell::sync::Lazy;
use protocall::{
    Argument, AsyncTarget, CallOutcome, CompletionCallback, ExecutionCallback,
    InvocationContext, InvocationDispatcher, InvocationError, InvocationId, InvocationParameter,
    InvocationProxy, LocalTransport, OperationDescriptor, ProgressSnapshot, ProtocolConfig,
    TargetDescriptor, TargetFuture, TargetRegistry, Transport,
};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};
use tracing_subscriber::EnvFilter;

pub const FILES: &str = "files";

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

fn op(name: &str, parameter_types: &[&str]) -> OperationDescriptor {
    OperationDescriptor::new(name, parameter_types.iter().copied())
}

/// Interface the test file service declares to its callers.
pub fn file_service(target_id: &str) -> TargetDescriptor {
    TargetDescriptor::new(target_id, "FileService")
        .operation(op("size", &["string"]))
        .operation(op("size", &["string", "completion"]))
        .operation(op("copy", &["u64", "execution"]))
        .operation(op("copy", &["u64", "execution", "completion"]))
        .operation(op("overwrite", &["string", "completion"]))
        .operation(op("overwrite", &["string", "execution", "completion"]))
        .operation(op("hang", &[]))
        .operation(op("hang", &["execution", "completion"]))
        .operation(op("fail", &[]))
        .operation(op("fail", &["completion"]))
        .operation(op("abandon", &["completion"]))
}

/// What the callee side saw, for assertions about work it did after the caller moved on.
#[derive(Default)]
pub struct Observations {
    pub hanging: AtomicUsize,
    pub stopped: AtomicUsize,
    pub late_results: Mutex<Vec<bool>>,
}

fn path_arg(parameter: &InvocationParameter) -> String {
    parameter
        .arg(0)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn serve(
    context: InvocationContext,
    parameter: InvocationParameter,
    observed: Arc<Observations>,
) -> TargetFuture {
    Box::pin(async move {
        match parameter.operation.as_str() {
            "size" => Ok(json!(path_arg(&parameter).len() as u64 * 100)),
            "copy" => {
                let steps = parameter.arg(0).and_then(Value::as_u64).unwrap_or(0);
                let base = ProgressSnapshot::new().description("copying").total_steps(steps);
                context.progress().push(base.clone());
                for worked in 1..=steps {
                    context.progress().push(base.clone().total_worked(worked));
                    context.progress().push(base.clone().total_worked(worked));
                }
                context.progress().push(base.total_worked(steps).finished());
                Ok(json!(steps))
            }
            "overwrite" => {
                let question = json!(format!("overwrite {}?", path_arg(&parameter)));
                let answer = context.questions().ask(question).await?;
                Ok(answer)
            }
            "hang" => {
                observed.hanging.fetch_add(1, Ordering::SeqCst);
                context.cancellation_token().cancelled().await;
                observed.stopped.fetch_add(1, Ordering::SeqCst);
                let delivered = context.outcome().finished(json!("too late"));
                observed.late_results.lock().unwrap().push(delivered);
                Ok(Value::Null)
            }
            "fail" => Err(anyhow!("disk full")),
            "abandon" => {
                context.request_cancel();
                Ok(json!("abandoned"))
            }
            other => bail!("unhandled operation {other}"),
        }
    })
}

/// A dispatcher serving the file service behind a [`LocalTransport`].
pub struct Harness {
    pub config: ProtocolConfig,
    pub dispatcher: Arc<InvocationDispatcher>,
    pub transport: Arc<LocalTransport>,
    pub observed: Arc<Observations>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        init_tracing();
        let observed = Arc::new(Observations::default());
        let targets = Arc::new(TargetRegistry::new());
        let served = observed.clone();
        targets.register(
            FILES,
            Arc::new(AsyncTarget::new(move |context, parameter| {
                serve(context, parameter, served.clone())
            })),
        );

        let dispatcher = Arc::new(InvocationDispatcher::new(targets, &config));
        let transport = LocalTransport::new(dispatcher.clone(), &config, Handle::current());
        Self {
            config,
            dispatcher,
            transport,
            observed,
        }
    }

    pub fn proxy(&self) -> InvocationProxy {
        self.proxy_for(FILES)
    }

    pub fn proxy_for(&self, target_id: &str) -> InvocationProxy {
        let transport: Arc<dyn Transport> = self.transport.clone();
        InvocationProxy::new(file_service(target_id), transport, &self.config)
            .with_telemetry(self.dispatcher.telemetry().clone())
    }

    pub fn client(&self) -> FileServiceClient {
        FileServiceClient {
            proxy: self.proxy(),
        }
    }

    /// Waits until no invocation, question or pending call is left anywhere.
    pub async fn settled(&self) {
        let wait = async {
            while !self.dispatcher.coordinator().is_empty()
                || !self.dispatcher.correlations().is_empty()
                || self.transport.pending_len() != 0
            {
                sleep(Duration::from_millis(5)).await;
            }
        };
        timeout(Duration::from_secs(5), wait)
            .await
            .expect("registries did not drain");
    }

    pub async fn until_hanging(&self, count: usize) {
        let wait = async {
            while self.observed.hanging.load(Ordering::SeqCst) < count {
                sleep(Duration::from_millis(5)).await;
            }
        };
        timeout(Duration::from_secs(5), wait)
            .await
            .expect("operation never started");
    }

    pub async fn until_stopped(&self, count: usize) {
        let wait = async {
            while self.observed.stopped.load(Ordering::SeqCst) < count {
                sleep(Duration::from_millis(5)).await;
            }
        };
        timeout(Duration::from_secs(5), wait)
            .await
            .expect("operation never observed the cancel");
    }
}

/// Typed face over the file service proxy.
#[derive(Clone)]
pub struct FileServiceClient {
    proxy: InvocationProxy,
}

impl FileServiceClient {
    fn returned(&self, operation: &str, args: Vec<Argument>) -> Result<Value, InvocationError> {
        self.proxy
            .call(operation, args)?
            .into_value()
            .ok_or_else(|| InvocationError::Operation(anyhow!("{operation} did not block")))
    }

    pub fn size(&self, path: &str) -> Result<u64, InvocationError> {
        let value = self.returned("size", vec![Argument::value(path)])?;
        value
            .as_u64()
            .ok_or_else(|| InvocationError::Operation(anyhow!("size returned {value}")))
    }

    pub fn copy(
        &self,
        steps: u64,
        monitor: Arc<dyn ExecutionCallback>,
    ) -> Result<u64, InvocationError> {
        let args = vec![Argument::value(steps), Argument::execution(monitor)];
        let value = self.returned("copy", args)?;
        value
            .as_u64()
            .ok_or_else(|| InvocationError::Operation(anyhow!("copy returned {value}")))
    }

    pub fn hang(&self) -> Result<Value, InvocationError> {
        self.returned("hang", vec![])
    }

    pub fn fail(&self) -> Result<Value, InvocationError> {
        self.returned("fail", vec![])
    }

    pub fn size_async(
        &self,
        path: &str,
        completion: Arc<dyn CompletionCallback>,
    ) -> Result<InvocationId, InvocationError> {
        dispatched(self.proxy.call(
            "size",
            vec![Argument::value(path), Argument::completion(completion)],
        )?)
    }
}

fn dispatched(outcome: CallOutcome) -> Result<InvocationId, InvocationError> {
    match outcome {
        CallOutcome::Dispatched(id) => Ok(id),
        CallOutcome::Returned(value) => Err(InvocationError::Operation(anyhow!(
            "expected an asynchronous call, got {value}"
        ))),
    }
}
