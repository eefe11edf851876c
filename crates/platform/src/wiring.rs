//! Platform wiring: builds the pipeline topology.
//!
//! ```text
//! gossip-in ─► hasher ─► post-hash collector ─► internal-validator
//!   ─► deduplicator ─► signature-validator ─► orphan-buffer
//!   ─► pces-sequencer ─┬─► in-order-linker ─► linked-event-intake ─► rounds
//!                      └─► pces-writer ─► durability-nexus
//! orphan-buffer ─► future-event-buffer ─► event-creation-manager
//!   ─► (INJECT back into internal-validator)
//! in-order-linker ─► shadowgraph
//! rounds ─► event-window-manager ─► window (INJECT to 8 stages)
//! pces-replayer ─► hasher (startup, before gossip is admitted)
//! ```
//!
//! Stages are built in topological order, which fixes the flush order at
//! wiring time. The only cycle (event creation back into the validator)
//! runs over an inject solder, so it can never deadlock.

use crate::config::PlatformConfig;
use crate::coordinator::PlatformCoordinator;
use crate::status::{PlatformStatus, StatusNexus};
use crate::window_manager::EventWindowManager;
use braid_consensus::ConsensusEngine;
use braid_intake::{
    EventCreationManager, EventDeduplicator, EventHasher, EventSignatureValidator,
    FutureEventBuffer, InOrderLinker, InternalEventValidator, OrphanBuffer, PostHashCollector,
    Shadowgraph, Ticketed, TransactionSupplier,
};
use braid_pces::{
    open_event_stream, DoneStreamingPces, DurabilityNexus, PcesError, PcesEventStream,
    PcesReplayer, PcesSequencer, PcesWriter,
};
use braid_types::{
    AddressBook, AncientMode, ConsensusRound, ConsensusSnapshot, EventWindow, GossipEvent,
    LinkedEvent, NodeId, Signer,
};
use braid_wiring::{
    InputWire, ObjectCounter, OutputWire, SchedulerPolicy, TaskScheduler, WiringError, WiringModel,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Errors from building the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error(transparent)]
    Pces(#[from] PcesError),
}

/// Capabilities the platform borrows from components outside the pipeline.
pub struct PlatformHooks {
    /// Flushes application-side transaction handling; invoked by the PCES
    /// replayer after the intake flush and before the done-streaming
    /// trigger.
    pub flush_transaction_handling: Box<dyn Fn() + Send + Sync>,
}

impl Default for PlatformHooks {
    fn default() -> Self {
        Self {
            flush_transaction_handling: Box::new(|| {}),
        }
    }
}

/// The assembled intake pipeline.
pub struct PlatformWiring {
    model: WiringModel,
    config: PlatformConfig,
    coordinator: Arc<PlatformCoordinator>,
    status: StatusNexus,
    durability: DurabilityNexus,
    shadowgraph: Arc<Shadowgraph>,
    hashing_counter: Arc<ObjectCounter>,

    // Inputs.
    gossip_input: InputWire<GossipEvent>,
    address_book_input: InputWire<AddressBook>,
    snapshot_input: InputWire<ConsensusSnapshot>,
    manual_window_input: InputWire<EventWindow>,
    creation_tick_input: InputWire<()>,
    discontinuity_input: InputWire<()>,
    minimum_ancient_input: InputWire<u64>,
    replay_input: InputWire<PcesEventStream>,
    writer_close_input: InputWire<()>,

    // Outputs available for external soldering.
    consensus_round_output: OutputWire<ConsensusRound>,
    event_output: OutputWire<Arc<GossipEvent>>,
    durable_sequence_output: OutputWire<u64>,

    // Stages retained for flushing and inspection.
    internal_validator: TaskScheduler<InternalEventValidator>,
    deduplicator: TaskScheduler<EventDeduplicator>,
    orphan_buffer: TaskScheduler<OrphanBuffer>,
    linker: TaskScheduler<InOrderLinker>,
    pces_writer: TaskScheduler<PcesWriter>,
}

impl PlatformWiring {
    pub fn new(
        config: PlatformConfig,
        address_book: AddressBook,
        self_id: NodeId,
        signer: Arc<dyn Signer>,
        transaction_supplier: Arc<dyn TransactionSupplier>,
        hooks: PlatformHooks,
    ) -> Result<Self, PlatformError> {
        let ancient_mode = config.ancient_mode;
        let consensus_config = config.consensus.clone().with_ancient_mode(ancient_mode);
        let genesis_window = EventWindow::genesis(ancient_mode);

        let model = WiringModel::new(config.pool_parallelism())?;
        let status = StatusNexus::new();
        let durability = DurabilityNexus::new();
        let hashing_counter = Arc::new(ObjectCounter::new(
            "hashing",
            Some(config.event_hasher_unhandled_capacity),
        ));

        // ─── Stages, in topological order ───────────────────────────────

        let hasher = model
            .scheduler("event-hasher")
            .policy(SchedulerPolicy::Concurrent)
            .extra_on_ramp(Arc::clone(&hashing_counter))
            .build(EventHasher::new());
        let collector = model
            .scheduler("post-hash-collector")
            .policy(SchedulerPolicy::SequentialThread)
            .build(PostHashCollector::new(Arc::clone(&hashing_counter)));
        let internal_validator = model
            .scheduler("internal-validator")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(InternalEventValidator::new(&config.intake, genesis_window));
        let deduplicator = model
            .scheduler("event-deduplicator")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(EventDeduplicator::new(genesis_window));
        let signature_validator = model
            .scheduler("signature-validator")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(EventSignatureValidator::new(address_book.clone()));
        let orphan_buffer = model
            .scheduler("orphan-buffer")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.orphan_buffer_capacity)
            .build(OrphanBuffer::new(genesis_window));
        let sequencer = model
            .scheduler("pces-sequencer")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(PcesSequencer::new());
        let linker = model
            .scheduler("in-order-linker")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(InOrderLinker::new(genesis_window));
        let consensus_intake = model
            .scheduler("linked-event-intake")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(ConsensusEngine::new(consensus_config, &address_book));
        let shadowgraph = Arc::new(Shadowgraph::new(genesis_window));
        let shadowgraph_stage = model
            .scheduler("shadowgraph")
            .policy(SchedulerPolicy::Sequential)
            .build(Arc::clone(&shadowgraph));
        let future_buffer = model
            .scheduler("future-event-buffer")
            .policy(SchedulerPolicy::Sequential)
            .capacity(config.future_event_buffer_capacity)
            .build(FutureEventBuffer::new(genesis_window));
        let creation_manager = model
            .scheduler("event-creation-manager")
            .policy(SchedulerPolicy::Sequential)
            .build(EventCreationManager::new(
                &config.intake,
                self_id,
                signer,
                transaction_supplier,
                genesis_window,
            ));
        let window_manager = model
            .scheduler("event-window-manager")
            .policy(SchedulerPolicy::Sequential)
            .build(EventWindowManager::new(genesis_window));
        let pces_writer = model
            .scheduler("pces-writer")
            .policy(SchedulerPolicy::SequentialThread)
            .capacity(config.default_scheduler_capacity)
            .build(PcesWriter::new(config.pces.clone(), ancient_mode)?);
        let durability_stage = model
            .scheduler("durability-nexus")
            .policy(SchedulerPolicy::Sequential)
            .build(durability.clone());

        // ─── Output wires ───────────────────────────────────────────────

        let hashed_out: OutputWire<Ticketed<Arc<GossipEvent>>> = OutputWire::new("hashed events");
        let collected_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("ordered hashed events");
        let validated_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("validated events");
        let deduped_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("unique events");
        let verified_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("verified events");
        let event_output: OutputWire<Arc<GossipEvent>> = OutputWire::new("pre-consensus events");
        let sequenced_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("sequenced events");
        let linked_out: OutputWire<LinkedEvent> = OutputWire::new("linked events");
        let consensus_round_output: OutputWire<ConsensusRound> =
            OutputWire::new("consensus rounds");
        let keystone_out: OutputWire<u64> = OutputWire::new("keystone sequence numbers");
        let window_out: OutputWire<EventWindow> = OutputWire::new("event windows");
        let future_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("current-round events");
        let created_out: OutputWire<Arc<GossipEvent>> = OutputWire::new("self events");
        let durable_sequence_output: OutputWire<u64> =
            OutputWire::new("durable sequence numbers");
        let done_streaming_out: OutputWire<DoneStreamingPces> =
            OutputWire::new("done streaming pces");
        let replay_events_out: OutputWire<GossipEvent> = OutputWire::new("replayed events");

        // ─── Input wires ────────────────────────────────────────────────

        let hasher_in = {
            let out = hashed_out.clone();
            hasher.concurrent_input(
                "events to hash",
                move |h: &EventHasher, t: Ticketed<GossipEvent>| {
                    let hashed = h.hash_event(t.item);
                    out.forward(Ticketed {
                        ticket: t.ticket,
                        item: hashed,
                    });
                },
            )
        };
        // Tickets are assigned on the caller's thread at put time, so the
        // collector can restore global input order after parallel hashing.
        let gossip_input = {
            let ticket = AtomicU64::new(0);
            hasher_in.with_transform("gossip events", move |event: GossipEvent| Ticketed {
                ticket: ticket.fetch_add(1, Ordering::Relaxed),
                item: event,
            })
        };

        let collector_in = {
            let out = collected_out.clone();
            collector.input_with(
                "hashed events",
                move |c: &mut PostHashCollector, t: Ticketed<Arc<GossipEvent>>| {
                    for event in c.collect(t) {
                        out.forward(event);
                    }
                },
            )
        };

        let validator_in = {
            let out = validated_out.clone();
            internal_validator.input_with(
                "events",
                move |v: &mut InternalEventValidator, e: Arc<GossipEvent>| {
                    if let Some(event) = v.validate(e) {
                        out.forward(event);
                    }
                },
            )
        };
        let validator_window_in = internal_validator.input_with(
            "event window",
            |v: &mut InternalEventValidator, w: EventWindow| v.update_window(w),
        );

        let dedup_in = {
            let out = deduped_out.clone();
            deduplicator.input_with(
                "events",
                move |d: &mut EventDeduplicator, e: Arc<GossipEvent>| {
                    if let Some(event) = d.dedup(e) {
                        out.forward(event);
                    }
                },
            )
        };
        let dedup_window_in = deduplicator.input_with(
            "event window",
            |d: &mut EventDeduplicator, w: EventWindow| d.update_window(w),
        );

        let signature_in = {
            let out = verified_out.clone();
            signature_validator.input_with(
                "events",
                move |s: &mut EventSignatureValidator, e: Arc<GossipEvent>| {
                    if let Some(event) = s.validate(e) {
                        out.forward(event);
                    }
                },
            )
        };
        let address_book_input = signature_validator.input_with(
            "address book updates",
            |s: &mut EventSignatureValidator, book: AddressBook| s.update_address_book(book),
        );

        let orphan_in = {
            let out = event_output.clone();
            orphan_buffer.input_with("events", move |o: &mut OrphanBuffer, e: Arc<GossipEvent>| {
                for released in o.handle_event(e) {
                    out.forward(released);
                }
            })
        };
        let orphan_window_in = {
            let out = event_output.clone();
            orphan_buffer.input_with(
                "event window",
                move |o: &mut OrphanBuffer, w: EventWindow| {
                    for released in o.update_window(w) {
                        out.forward(released);
                    }
                },
            )
        };

        let sequencer_in = {
            let out = sequenced_out.clone();
            sequencer.input_with("events", move |s: &mut PcesSequencer, e: Arc<GossipEvent>| {
                out.forward(s.assign(e));
            })
        };

        let linker_in = {
            let out = linked_out.clone();
            linker.input_with(
                "sequenced events",
                move |l: &mut InOrderLinker, e: Arc<GossipEvent>| {
                    if let Some(linked) = l.link(e) {
                        out.forward(linked);
                    }
                },
            )
        };
        let linker_window_in = linker.input_with(
            "event window",
            |l: &mut InOrderLinker, w: EventWindow| l.update_window(w),
        );

        let intake_in = {
            let rounds = consensus_round_output.clone();
            let keystones = keystone_out.clone();
            consensus_intake.input_with(
                "linked events",
                move |engine: &mut ConsensusEngine, linked: LinkedEvent| {
                    for round in engine.add_event(&linked) {
                        // The keystone flush request reaches the writer
                        // before the round fans out to consumers.
                        if let Some(sequence) = round.keystone_sequence_number() {
                            keystones.forward(sequence);
                        }
                        rounds.forward(round);
                    }
                },
            )
        };
        let snapshot_input = consensus_intake.input_with(
            "snapshot",
            |engine: &mut ConsensusEngine, snapshot: ConsensusSnapshot| {
                engine.load_snapshot(&snapshot)
            },
        );

        let shadowgraph_in = shadowgraph_stage.input_with(
            "linked events",
            |g: &mut Arc<Shadowgraph>, linked: LinkedEvent| g.insert(&linked),
        );
        let shadowgraph_window_in = shadowgraph_stage.input_with(
            "event window",
            |g: &mut Arc<Shadowgraph>, w: EventWindow| g.expire(w),
        );

        let future_in = {
            let out = future_out.clone();
            future_buffer.input_with(
                "events",
                move |f: &mut FutureEventBuffer, e: Arc<GossipEvent>| {
                    for event in f.handle_event(e) {
                        out.forward(event);
                    }
                },
            )
        };
        let future_window_in = {
            let out = future_out.clone();
            future_buffer.input_with(
                "event window",
                move |f: &mut FutureEventBuffer, w: EventWindow| {
                    for event in f.update_window(w) {
                        out.forward(event);
                    }
                },
            )
        };

        let creation_register_in = creation_manager.input_with(
            "candidate parents",
            |c: &mut EventCreationManager, e: Arc<GossipEvent>| c.register_event(e),
        );
        let creation_tick_input = {
            let out = created_out.clone();
            creation_manager.input_with("creation tick", move |c: &mut EventCreationManager, _: ()| {
                if let Some(event) = c.maybe_create() {
                    out.forward(event);
                }
            })
        };
        let creation_window_in = creation_manager.input_with(
            "event window",
            |c: &mut EventCreationManager, w: EventWindow| c.update_window(w),
        );

        let window_rounds_in = {
            let out = window_out.clone();
            window_manager.input_with(
                "consensus rounds",
                move |m: &mut EventWindowManager, round: ConsensusRound| {
                    if let Some(window) = m.on_consensus_round(&round) {
                        out.forward(window);
                    }
                },
            )
        };
        let manual_window_input = {
            let out = window_out.clone();
            window_manager.input_with(
                "manual window",
                move |m: &mut EventWindowManager, window: EventWindow| {
                    if let Some(window) = m.on_manual_window(window) {
                        out.forward(window);
                    }
                },
            )
        };

        let writer_event_in = {
            let out = durable_sequence_output.clone();
            let status = status.clone();
            pces_writer.input_with("sequenced events", move |w: &mut PcesWriter, e: Arc<GossipEvent>| {
                match w.handle_event(&e) {
                    Ok(Some(sequence)) => out.forward(sequence),
                    Ok(None) => {}
                    Err(err) => {
                        error!(%err, "PCES write failed; taking the node down");
                        status.set(PlatformStatus::Down);
                    }
                }
            })
        };
        let writer_flush_in = {
            let out = durable_sequence_output.clone();
            let status = status.clone();
            pces_writer.input_with("flush requests", move |w: &mut PcesWriter, keystone: u64| {
                match w.handle_flush_request(keystone) {
                    Ok(Some(sequence)) => out.forward(sequence),
                    Ok(None) => {}
                    Err(err) => {
                        error!(%err, "PCES flush failed; taking the node down");
                        status.set(PlatformStatus::Down);
                    }
                }
            })
        };
        let writer_window_in = pces_writer.input_with(
            "event window",
            |w: &mut PcesWriter, window: EventWindow| w.update_window(window),
        );
        let writer_done_in = pces_writer.input_with(
            "done streaming",
            |w: &mut PcesWriter, _: DoneStreamingPces| w.handle_done_streaming(),
        );
        let discontinuity_input = {
            let status = status.clone();
            pces_writer.input_with("discontinuity", move |w: &mut PcesWriter, _: ()| {
                if let Err(err) = w.register_discontinuity() {
                    error!(%err, "PCES discontinuity failed; taking the node down");
                    status.set(PlatformStatus::Down);
                }
            })
        };
        let minimum_ancient_input = pces_writer.input_with(
            "minimum ancient to store",
            |w: &mut PcesWriter, minimum: u64| {
                w.update_minimum_ancient_to_store(minimum);
            },
        );
        let writer_close_input = {
            let status = status.clone();
            pces_writer.input_with("close", move |w: &mut PcesWriter, _: ()| {
                if let Err(err) = w.close() {
                    error!(%err, "PCES close failed");
                    status.set(PlatformStatus::Down);
                }
            })
        };

        let durability_in = durability_stage.input_with(
            "durable sequences",
            |n: &mut DurabilityNexus, sequence: u64| n.set_latest_durable(sequence),
        );

        // ─── Soldering ──────────────────────────────────────────────────

        hashed_out.solder_to(&collector_in);
        collected_out.solder_to(&validator_in);
        validated_out.solder_to(&dedup_in);
        deduped_out.solder_to(&signature_in);
        verified_out.solder_to(&orphan_in);
        event_output.solder_to(&sequencer_in);
        event_output.solder_to(&future_in);
        sequenced_out.solder_to(&linker_in);
        sequenced_out.solder_to(&writer_event_in);
        linked_out.solder_to(&intake_in);
        linked_out.solder_to(&shadowgraph_in);
        future_out.solder_to(&creation_register_in);
        // The only cycle in the wiring: created events re-enter the
        // validator over an inject solder, which never blocks.
        created_out.solder_to_injecting(&validator_in);

        consensus_round_output.solder_to(&window_rounds_in);
        keystone_out.solder_to(&writer_flush_in);
        durable_sequence_output.solder_to(&durability_in);

        // Window broadcast: inject so the feedback loop cannot block.
        window_out.solder_to_injecting(&validator_window_in);
        window_out.solder_to_injecting(&dedup_window_in);
        window_out.solder_to_injecting(&orphan_window_in);
        window_out.solder_to_injecting(&linker_window_in);
        window_out.solder_to_injecting(&writer_window_in);
        window_out.solder_to_injecting(&creation_window_in);
        window_out.solder_to_injecting(&shadowgraph_window_in);
        window_out.solder_to_injecting(&future_window_in);

        // ─── Coordinator and replayer ───────────────────────────────────

        let coordinator = Arc::new(PlatformCoordinator::new(
            Arc::clone(&hashing_counter),
            vec![
                internal_validator.flush_handle(),
                deduplicator.flush_handle(),
                signature_validator.flush_handle(),
                orphan_buffer.flush_handle(),
                sequencer.flush_handle(),
                linker.flush_handle(),
                consensus_intake.flush_handle(),
                shadowgraph_stage.flush_handle(),
                future_buffer.flush_handle(),
                creation_manager.flush_handle(),
                window_manager.flush_handle(),
            ],
        ));

        let replayer = {
            let flush_coordinator = Arc::clone(&coordinator);
            let flush_transaction_handling = hooks.flush_transaction_handling;
            PcesReplayer::new(
                replay_events_out.clone(),
                move || flush_coordinator.flush_intake_pipeline(),
                move || flush_transaction_handling(),
            )
        };
        replay_events_out.solder_to(&gossip_input);

        let replayer_stage = model
            .scheduler("pces-replayer")
            .policy(SchedulerPolicy::Direct)
            .build(replayer);
        let replay_input = {
            let out = done_streaming_out.clone();
            let status = status.clone();
            replayer_stage.input_with(
                "event stream to replay",
                move |r: &mut PcesReplayer, stream: PcesEventStream| match r.replay(stream) {
                    Ok(done) => out.forward(done),
                    Err(err) => {
                        error!(%err, "PCES replay failed; taking the node down");
                        status.set(PlatformStatus::Down);
                    }
                },
            )
        };
        done_streaming_out.solder_to(&writer_done_in);
        {
            let status = status.clone();
            done_streaming_out.solder_fn("status", move |_| {
                status.set(PlatformStatus::Active);
            });
        }

        model.start();

        Ok(Self {
            model,
            config,
            coordinator,
            status,
            durability,
            shadowgraph,
            hashing_counter,
            gossip_input,
            address_book_input,
            snapshot_input,
            manual_window_input,
            creation_tick_input,
            discontinuity_input,
            minimum_ancient_input,
            replay_input,
            writer_close_input,
            consensus_round_output,
            event_output,
            durable_sequence_output,
            internal_validator,
            deduplicator,
            orphan_buffer,
            linker,
            pces_writer,
        })
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Stream the PCES back through the pipeline. Blocks until the replay
    /// and both flushes complete; gossip should only be admitted after
    /// this returns and the status is [`PlatformStatus::Active`].
    ///
    /// With an empty PCES directory (genesis) this completes immediately
    /// and simply activates the writer.
    pub fn replay_pces(&self, starting_ancient_threshold: u64) -> Result<(), PlatformError> {
        self.status.set(PlatformStatus::ReplayingEvents);
        let stream = open_event_stream(
            &self.config.pces.directory,
            starting_ancient_threshold,
            self.config.ancient_mode,
        )?;
        self.replay_input.put(stream);
        Ok(())
    }

    /// Resume from a persisted consensus snapshot: seeds the engine and
    /// re-arms the window before replay.
    pub fn load_snapshot(&self, snapshot: &ConsensusSnapshot) {
        self.snapshot_input.put(snapshot.clone());
        let ancient_threshold = match self.config.ancient_mode {
            AncientMode::Generation => snapshot.min_round_generation,
            AncientMode::BirthRound => (snapshot.round + 1)
                .saturating_sub(self.config.consensus.rounds_non_ancient),
        };
        self.shadowgraph.start_from_threshold(ancient_threshold);
        self.manual_window_input.put(EventWindow {
            latest_consensus_round: snapshot.round,
            ancient_threshold,
            min_round_generation: snapshot.min_round_generation,
            ancient_mode: self.config.ancient_mode,
        });
    }

    /// Flush the intake pipeline in topological order.
    pub fn flush_intake_pipeline(&self) {
        self.coordinator.flush_intake_pipeline();
    }

    /// Stop the pipeline: close the PCES cleanly, then stop every stage.
    /// Pending queue items are dropped.
    pub fn stop(&self) {
        self.writer_close_input.put(());
        self.pces_writer.flush();
        self.model.stop();
    }

    // ─── Surface ────────────────────────────────────────────────────────

    /// Input for raw gossip events. Blocks while the hashing region is at
    /// capacity.
    pub fn gossip_input(&self) -> &InputWire<GossipEvent> {
        &self.gossip_input
    }

    /// Input for address book updates; must be ordered ahead of the first
    /// event signed under the new book.
    pub fn address_book_input(&self) -> &InputWire<AddressBook> {
        &self.address_book_input
    }

    /// Prod the event creation manager to create a self event.
    pub fn creation_tick_input(&self) -> &InputWire<()> {
        &self.creation_tick_input
    }

    /// Register an external discontinuity (e.g. reconnect) in the PCES.
    pub fn discontinuity_input(&self) -> &InputWire<()> {
        &self.discontinuity_input
    }

    /// Oldest ancient identifier that must stay on disk, fed from the
    /// state file manager; older segment files become deletable.
    pub fn minimum_ancient_input(&self) -> &InputWire<u64> {
        &self.minimum_ancient_input
    }

    /// Decided consensus rounds, for the application state machine and the
    /// post-consensus signature collector.
    pub fn consensus_round_output(&self) -> &OutputWire<ConsensusRound> {
        &self.consensus_round_output
    }

    /// Ordered pre-consensus events leaving the orphan buffer, for
    /// application prehandle and the pre-consensus signature collector.
    pub fn event_output(&self) -> &OutputWire<Arc<GossipEvent>> {
        &self.event_output
    }

    /// Latest durable PCES sequence numbers as they advance.
    pub fn durable_sequence_output(&self) -> &OutputWire<u64> {
        &self.durable_sequence_output
    }

    /// Gate for releasing consensus rounds to the application: a round may
    /// be applied once its keystone sequence number is durable.
    pub fn durability(&self) -> &DurabilityNexus {
        &self.durability
    }

    pub fn status(&self) -> PlatformStatus {
        self.status.get()
    }

    /// The shadowgraph, for gossip peer-sync queries.
    pub fn shadowgraph(&self) -> &Arc<Shadowgraph> {
        &self.shadowgraph
    }

    /// Unprocessed events in the hashing region, for gossip throttling.
    pub fn hasher_unprocessed_task_count(&self) -> u64 {
        self.hashing_counter.count()
    }

    // ─── Inspection (tests, diagnostics) ────────────────────────────────

    pub fn validator_dropped(&self) -> u64 {
        self.internal_validator.with_component(|v| v.dropped())
    }

    pub fn duplicates_dropped(&self) -> u64 {
        self.deduplicator.with_component(|d| d.duplicates())
    }

    pub fn orphans_held(&self) -> usize {
        self.orphan_buffer.with_component(|o| o.orphan_count())
    }

    pub fn linker_invariant_violations(&self) -> u64 {
        self.linker.with_component(|l| l.invariant_violations())
    }
}
