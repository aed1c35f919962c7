use async_trait::async_trait;
use uuid::Uuid;

use common::{Envelope, MessageGateway};
use event_store::{EventEnvelope, PersistedEvent};
use projections::Projection;

use crate::error::{ProcessError, Result};
use crate::process::{CommandBuffer, Process, ProcessId};
use crate::repo::{ProcessHistoryEntry, ProcessManager, ProcessRepo};

/// Registration of one process type: its name, the entry-point predicate
/// deciding whether an event starts a new instance, and the factory for a
/// fresh state to replay into.
pub struct ProcessDescriptor {
    pub name: &'static str,
    pub entry_point: fn(&EventEnvelope) -> bool,
    pub factory: fn() -> Box<dyn Process>,
}

type TopicExtractor = Box<dyn Fn(&EventEnvelope) -> Vec<Uuid> + Send + Sync>;

/// The process-manager engine.
///
/// Driven by the same event stream as any projection: for every committed
/// event it starts instances whose entry point matches, routes the event to
/// every instance subscribed to one of its topics, and forwards the commands
/// those instances publish to the message gateway.
pub struct ProcessManagers<R: ProcessRepo, G: MessageGateway> {
    repo: R,
    gateway: G,
    descriptors: Vec<ProcessDescriptor>,
    topic_extractor: TopicExtractor,
}

impl<R: ProcessRepo, G: MessageGateway> ProcessManagers<R, G> {
    pub fn new(repo: R, gateway: G) -> Self {
        Self {
            repo,
            gateway,
            descriptors: Vec::new(),
            topic_extractor: Box::new(|_| Vec::new()),
        }
    }

    /// Sets the extractor producing an event payload's correlation topics,
    /// typically by decoding it and asking its `EventTopics` implementation.
    pub fn with_topic_extractor(
        mut self,
        extractor: impl Fn(&EventEnvelope) -> Vec<Uuid> + Send + Sync + 'static,
    ) -> Self {
        self.topic_extractor = Box::new(extractor);
        self
    }

    /// Registers a process type. Each type can be registered only once.
    pub fn register(mut self, descriptor: ProcessDescriptor) -> Result<Self> {
        if self
            .descriptors
            .iter()
            .any(|registered| registered.name == descriptor.name)
        {
            return Err(ProcessError::AlreadyRegistered(descriptor.name));
        }
        self.descriptors.push(descriptor);
        Ok(self)
    }

    /// Handles one committed event: starts matching instances, then routes
    /// the event to every subscribed instance.
    ///
    /// A failing instance does not block unrelated instances from handling
    /// the same event; the first failure is still reported after the rest
    /// have run.
    #[tracing::instrument(skip_all, fields(message_id = %event.message_id))]
    pub async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        self.start_new_processes(event).await?;

        let topics = self.topics_of(event);
        let mut subscribers: Vec<ProcessId> = self
            .repo
            .find_subscribers_to_any_of(&topics)
            .await?
            .into_iter()
            .collect();
        subscribers.sort();

        let mut first_failure = None;
        for process_id in subscribers {
            if let Err(error) = self.run_process(process_id, event).await {
                tracing::error!(%process_id, %error, "process failed to handle event");
                metrics::counter!("process_manager_failures").increment(1);
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
        }
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn start_new_processes(&self, event: &EventEnvelope) -> Result<()> {
        for descriptor in &self.descriptors {
            if (descriptor.entry_point)(event) {
                // Known gap: if the process crashes after this save but
                // before the event is fully handled, redelivery starts a
                // duplicate instance.
                let process_id = ProcessId::new();
                let mut process = ProcessManager::create(process_id, descriptor.name);
                // subscribe to itself to receive responses to own commands
                process.subscribe(process_id.as_uuid());
                // always handle the first message, which is not yet
                // correlated to the new instance
                process.subscribe(event.message_id.as_uuid());
                self.repo.save(&mut process).await?;
                tracing::debug!(
                    %process_id,
                    process_type = descriptor.name,
                    "started process instance"
                );
                metrics::counter!("process_manager_instances_started").increment(1);
            }
        }
        Ok(())
    }

    fn topics_of(&self, event: &EventEnvelope) -> Vec<Uuid> {
        let mut topics = (self.topic_extractor)(event);
        topics.push(event.correlation_id);
        topics.push(event.message_id.as_uuid());
        topics
    }

    async fn run_process(&self, process_id: ProcessId, event: &EventEnvelope) -> Result<()> {
        let mut process = self.repo.get_by_id(process_id).await?;
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.name == process.process_type())
            .ok_or_else(|| ProcessError::UnknownProcessType(process.process_type().to_string()))?;

        let mut state = (descriptor.factory)();
        let mut commands = CommandBuffer::new();
        for entry in process.history() {
            if let ProcessHistoryEntry::Handled(old_event) = entry {
                state.apply(old_event, &mut commands)?;
                // avoid republishing historical side effects
                commands.clear();
            }
        }

        state.apply(event, &mut commands)?;
        process.record_handled(event.clone());
        self.repo.save(&mut process).await?;

        for command in commands.drain() {
            self.gateway.send(
                Envelope::caused_by(command, event).with_correlation_id(process_id.as_uuid()),
            );
        }
        Ok(())
    }
}

/// Lets the engine consume the global event stream through the same
/// worker-pool machinery as any read model.
///
/// Engine failures at this boundary are logged and do not halt the stream:
/// an event a failing process could not handle must not stop later events
/// from reaching other processes.
pub struct ProcessManagersProjection<R: ProcessRepo, G: MessageGateway> {
    engine: ProcessManagers<R, G>,
}

impl<R: ProcessRepo, G: MessageGateway> ProcessManagersProjection<R, G> {
    pub fn new(engine: ProcessManagers<R, G>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<R: ProcessRepo, G: MessageGateway> Projection for ProcessManagersProjection<R, G> {
    fn name(&self) -> &'static str {
        "ProcessManagers"
    }

    async fn apply(&mut self, event: &PersistedEvent) -> projections::Result<()> {
        if let Err(error) = self.engine.handle(&event.event).await {
            tracing::error!(
                position = %event.position,
                %error,
                "process manager dispatch failed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryProcessRepo;
    use common::{
        CommandData, CommandMessage, DomainEvent, EventData, EventTopics, MessageContext,
        RecordingGateway,
    };
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum RegisterEvent {
        RegisterCreated { register_id: Uuid, initial_value: i64 },
        ValueAddedToRegister { register_id: Uuid, value: i64 },
    }

    impl DomainEvent for RegisterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                RegisterEvent::RegisterCreated { .. } => "RegisterCreated",
                RegisterEvent::ValueAddedToRegister { .. } => "ValueAddedToRegister",
            }
        }
    }

    impl EventTopics for RegisterEvent {
        fn topics(&self) -> Vec<Uuid> {
            match self {
                RegisterEvent::RegisterCreated { register_id, .. }
                | RegisterEvent::ValueAddedToRegister { register_id, .. } => vec![*register_id],
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ShowCurrentValue {
        register_id: Uuid,
        value: i64,
    }

    impl CommandMessage for ShowCurrentValue {
        const TYPE: &'static str = "ShowCurrentValue";
    }

    #[derive(Debug, Default)]
    struct RegisterProcess {
        value: i64,
    }

    impl Process for RegisterProcess {
        fn apply(&mut self, event: &EventEnvelope, commands: &mut CommandBuffer) -> Result<()> {
            let Ok(event) = event.payload.decode::<RegisterEvent>() else {
                return Ok(());
            };
            match event {
                RegisterEvent::RegisterCreated {
                    register_id,
                    initial_value,
                } => {
                    self.value = initial_value;
                    commands.publish(&ShowCurrentValue {
                        register_id,
                        value: self.value,
                    })?;
                }
                RegisterEvent::ValueAddedToRegister { register_id, value } => {
                    self.value += value;
                    commands.publish(&ShowCurrentValue {
                        register_id,
                        value: self.value,
                    })?;
                }
            }
            Ok(())
        }
    }

    fn register_process_descriptor() -> ProcessDescriptor {
        ProcessDescriptor {
            name: "RegisterProcess",
            entry_point: |event| event.payload.event_type == "RegisterCreated",
            factory: || Box::new(RegisterProcess::default()),
        }
    }

    fn engine(
        repo: InMemoryProcessRepo,
        gateway: Arc<RecordingGateway>,
    ) -> ProcessManagers<InMemoryProcessRepo, Arc<RecordingGateway>> {
        ProcessManagers::new(repo, gateway)
            .register(register_process_descriptor())
            .unwrap()
    }

    fn register_created(register_id: Uuid, initial_value: i64) -> EventEnvelope {
        Envelope::new(
            EventData::encode(&RegisterEvent::RegisterCreated {
                register_id,
                initial_value,
            })
            .unwrap(),
            &MessageContext::empty(),
        )
    }

    fn value_added_after(
        register_id: Uuid,
        value: i64,
        cause: &Envelope<CommandData>,
    ) -> EventEnvelope {
        Envelope::caused_by(
            EventData::encode(&RegisterEvent::ValueAddedToRegister { register_id, value })
                .unwrap(),
            cause,
        )
    }

    fn published_commands(gateway: &RecordingGateway) -> Vec<ShowCurrentValue> {
        gateway
            .sent()
            .iter()
            .map(|envelope| envelope.payload.decode::<ShowCurrentValue>().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn processes_receive_events_and_publish_commands() {
        let gateway = Arc::new(RecordingGateway::new());
        let engine = engine(InMemoryProcessRepo::new(), gateway.clone());
        let register_id = Uuid::new_v4();

        engine.handle(&register_created(register_id, 42)).await.unwrap();

        assert_eq!(
            published_commands(&gateway),
            vec![ShowCurrentValue {
                register_id,
                value: 42
            }]
        );
    }

    #[tokio::test]
    async fn published_commands_have_the_event_id_as_their_causation_id() {
        let gateway = Arc::new(RecordingGateway::new());
        let engine = engine(InMemoryProcessRepo::new(), gateway.clone());
        let event = register_created(Uuid::new_v4(), 42);

        engine.handle(&event).await.unwrap();

        assert_eq!(
            gateway.latest().unwrap().causation_id,
            Some(event.message_id)
        );
    }

    #[tokio::test]
    async fn published_commands_have_the_process_id_as_their_correlation_id() {
        let gateway = Arc::new(RecordingGateway::new());
        let repo = InMemoryProcessRepo::new();
        let engine = engine(repo.clone(), gateway.clone());

        engine
            .handle(&register_created(Uuid::new_v4(), 42))
            .await
            .unwrap();

        // the process ID is not directly visible, but an instance with the
        // same ID as the correlation ID must exist
        let correlation_id = gateway.latest().unwrap().correlation_id;
        let process = repo
            .get_by_id(ProcessId::from_uuid(correlation_id))
            .await
            .unwrap();
        assert_eq!(process.process_type(), "RegisterProcess");
    }

    #[tokio::test]
    async fn processes_are_stateful() {
        let gateway = Arc::new(RecordingGateway::new());
        let engine = engine(InMemoryProcessRepo::new(), gateway.clone());
        let register_id = Uuid::new_v4();

        engine.handle(&register_created(register_id, 10)).await.unwrap();
        engine
            .handle(&value_added_after(
                register_id,
                20,
                &gateway.latest().unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(
            published_commands(&gateway),
            vec![
                ShowCurrentValue {
                    register_id,
                    value: 10
                },
                ShowCurrentValue {
                    register_id,
                    value: 30
                },
            ]
        );
    }

    #[tokio::test]
    async fn process_state_is_independent_from_other_processes() {
        let gateway = Arc::new(RecordingGateway::new());
        let engine = engine(InMemoryProcessRepo::new(), gateway.clone());
        let register_id = Uuid::new_v4();
        let register_id2 = Uuid::new_v4();

        engine.handle(&register_created(register_id, 10)).await.unwrap();
        let command1 = gateway.latest().unwrap();
        engine
            .handle(&register_created(register_id2, 100))
            .await
            .unwrap();
        let command2 = gateway.latest().unwrap();
        engine
            .handle(&value_added_after(register_id, 20, &command1))
            .await
            .unwrap();
        engine
            .handle(&value_added_after(register_id2, 200, &command2))
            .await
            .unwrap();

        assert_eq!(
            published_commands(&gateway),
            vec![
                ShowCurrentValue {
                    register_id,
                    value: 10
                },
                ShowCurrentValue {
                    register_id: register_id2,
                    value: 100
                },
                ShowCurrentValue {
                    register_id,
                    value: 30
                },
                ShowCurrentValue {
                    register_id: register_id2,
                    value: 300
                },
            ]
        );
    }

    #[tokio::test]
    async fn loading_an_existing_process_does_not_republish_old_commands() {
        let gateway = Arc::new(RecordingGateway::new());
        let repo = InMemoryProcessRepo::new();
        let engine1 = engine(repo.clone(), gateway.clone());
        let register_id = Uuid::new_v4();
        engine1
            .handle(&register_created(register_id, 10))
            .await
            .unwrap();

        let gateway2 = Arc::new(RecordingGateway::new());
        let engine2 = engine(repo, gateway2.clone());
        engine2
            .handle(&value_added_after(
                register_id,
                20,
                &gateway.latest().unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(
            published_commands(&gateway2),
            vec![ShowCurrentValue {
                register_id,
                value: 30
            }]
        );
    }

    #[tokio::test]
    async fn ignores_events_which_nobody_is_subscribed_to() {
        let gateway = Arc::new(RecordingGateway::new());
        let engine = engine(InMemoryProcessRepo::new(), gateway.clone());

        engine
            .handle(&Envelope::new(
                EventData::encode(&RegisterEvent::ValueAddedToRegister {
                    register_id: Uuid::new_v4(),
                    value: 42,
                })
                .unwrap(),
                &MessageContext::empty(),
            ))
            .await
            .unwrap();

        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn cannot_register_the_same_process_twice() {
        let gateway = Arc::new(RecordingGateway::new());
        let result = engine(InMemoryProcessRepo::new(), gateway)
            .register(register_process_descriptor());

        assert!(matches!(
            result,
            Err(ProcessError::AlreadyRegistered("RegisterProcess"))
        ));
    }

    #[tokio::test]
    async fn payload_topics_route_events_to_subscribed_instances() {
        let gateway = Arc::new(RecordingGateway::new());
        let repo = InMemoryProcessRepo::new();
        let engine = ProcessManagers::new(repo.clone(), gateway.clone())
            .with_topic_extractor(|event| {
                event
                    .payload
                    .decode::<RegisterEvent>()
                    .map(|e| e.topics())
                    .unwrap_or_default()
            })
            .register(register_process_descriptor())
            .unwrap();
        let register_id = Uuid::new_v4();
        engine.handle(&register_created(register_id, 10)).await.unwrap();

        // subscribe the instance to the register, then route by payload
        // topic alone, without any correlation to the instance
        let process_id = ProcessId::from_uuid(gateway.latest().unwrap().correlation_id);
        let mut process = repo.get_by_id(process_id).await.unwrap();
        process.subscribe(register_id);
        repo.save(&mut process).await.unwrap();

        engine
            .handle(&Envelope::new(
                EventData::encode(&RegisterEvent::ValueAddedToRegister {
                    register_id,
                    value: 20,
                })
                .unwrap(),
                &MessageContext::empty(),
            ))
            .await
            .unwrap();

        assert_eq!(
            published_commands(&gateway).last(),
            Some(&ShowCurrentValue {
                register_id,
                value: 30
            })
        );
    }

    #[tokio::test]
    async fn replaying_a_saga_instance_never_reemits_commands() {
        let gateway = Arc::new(RecordingGateway::new());
        let repo = InMemoryProcessRepo::new();
        let engine1 = engine(repo.clone(), gateway.clone());
        let register_id = Uuid::new_v4();
        engine1.handle(&register_created(register_id, 10)).await.unwrap();
        engine1
            .handle(&value_added_after(
                register_id,
                20,
                &gateway.latest().unwrap(),
            ))
            .await
            .unwrap();
        let commands_so_far = gateway.sent().len();

        // loading and replaying the instance's full history emits nothing
        let process_id = ProcessId::from_uuid(gateway.latest().unwrap().correlation_id);
        let process = repo.get_by_id(process_id).await.unwrap();
        let mut state = RegisterProcess::default();
        let mut commands = CommandBuffer::new();
        for entry in process.history() {
            if let ProcessHistoryEntry::Handled(old_event) = entry {
                state.apply(&old_event, &mut commands).unwrap();
                commands.clear();
            }
        }

        assert!(commands.is_empty());
        assert_eq!(gateway.sent().len(), commands_so_far);
        assert_eq!(state.value, 30);
    }
}
