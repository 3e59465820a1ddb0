//! Property tests for desired-vs-actual convergence.
//!
//! A small simulated fleet executes every command it receives and reports
//! back immediately, the way a healthy agent would within one period.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::Utc;
use fleet_id::{AgentId, ServiceIdSequence};
use fleet_proto::{ControllerCommand, ServiceState};
use fleet_reconcile::{
    agent_lost, reconcile, CommandSender, DesiredReplicas, FleetRegistry, SendError,
};
use proptest::prelude::*;

type Outbox = Rc<RefCell<Vec<(AgentId, ControllerCommand)>>>;

struct SimLink {
    agent_id: AgentId,
    outbox: Outbox,
}

impl CommandSender for SimLink {
    fn send(&self, command: ControllerCommand) -> Result<(), SendError> {
        self.outbox
            .borrow_mut()
            .push((self.agent_id.clone(), command));
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect(u8),
    Disconnect(u8),
    ScaleUp(u32),
    ScaleDown(u32),
    Tick,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Connect),
        (0u8..4).prop_map(Op::Disconnect),
        (0u32..5).prop_map(Op::ScaleUp),
        (0u32..5).prop_map(Op::ScaleDown),
        Just(Op::Tick),
    ]
}

struct Sim {
    registry: FleetRegistry<SimLink>,
    outbox: Outbox,
    sequences: BTreeMap<AgentId, ServiceIdSequence>,
    connections: BTreeMap<AgentId, u64>,
    next_connection: u64,
    desired: DesiredReplicas,
    passes: usize,
}

impl Sim {
    fn new(desired: u32) -> Self {
        Self {
            registry: FleetRegistry::new(),
            outbox: Rc::default(),
            sequences: BTreeMap::new(),
            connections: BTreeMap::new(),
            next_connection: 0,
            desired: DesiredReplicas::new(desired),
            passes: 0,
        }
    }

    fn agent(n: u8) -> AgentId {
        format!("agent-{n}").parse().unwrap()
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Connect(n) => {
                let agent_id = Self::agent(*n);
                if self.connections.contains_key(&agent_id) {
                    return;
                }
                self.next_connection += 1;
                let link = SimLink {
                    agent_id: agent_id.clone(),
                    outbox: self.outbox.clone(),
                };
                self.registry
                    .register_agent(agent_id.clone(), link, self.next_connection);
                self.connections.insert(agent_id.clone(), self.next_connection);
                self.sequences
                    .entry(agent_id.clone())
                    .or_insert_with(|| ServiceIdSequence::new(agent_id));
            }
            Op::Disconnect(n) => {
                let agent_id = Self::agent(*n);
                if let Some(connection) = self.connections.remove(&agent_id) {
                    if agent_lost(&mut self.registry, &agent_id, connection, self.desired).is_some()
                    {
                        self.passes += 1;
                    }
                    // Instances on a lost agent are gone for good.
                    self.outbox.borrow_mut().retain(|(a, _)| a != &agent_id);
                }
            }
            Op::ScaleUp(count) => {
                self.desired.scale_up(*count);
                self.pass();
            }
            Op::ScaleDown(count) => {
                self.desired.scale_down(*count);
                self.pass();
            }
            Op::Tick => self.pass(),
        }
        self.deliver();
    }

    fn pass(&mut self) {
        reconcile(&mut self.registry, self.desired);
        self.passes += 1;
    }

    /// Agents act on every queued command and report the result.
    fn deliver(&mut self) {
        let sent = std::mem::take(&mut *self.outbox.borrow_mut());
        for (agent_id, command) in sent {
            let (service_id, state) = match command {
                ControllerCommand::StartService => {
                    let Some(seq) = self.sequences.get_mut(&agent_id) else {
                        continue;
                    };
                    (
                        seq.next_id(),
                        ServiceState::Running {
                            start_time: Utc::now(),
                        },
                    )
                }
                ControllerCommand::StopService { service_id } => {
                    (service_id, ServiceState::Stopped)
                }
            };
            let _ = self.registry.upsert_instance(service_id, &agent_id, state);
        }
    }
}

proptest! {
    /// After any sequence of connects, disconnects and scale changes, one
    /// more pass brings the registry to the desired count when at least one
    /// agent is connected, and to zero otherwise.
    #[test]
    fn converges_after_one_pass(
        initial in 0u32..6,
        ops in proptest::collection::vec(op_strategy(), 0..40),
    ) {
        let mut sim = Sim::new(initial);
        for op in &ops {
            sim.apply(op);
        }
        sim.apply(&Op::Tick);

        let total = sim.registry.total_instance_count();
        if sim.registry.agent_count() > 0 {
            prop_assert_eq!(total, sim.desired.get() as usize);
        } else {
            prop_assert_eq!(total, 0);
        }
    }

    /// Every instance in the registry belongs to a registered agent.
    #[test]
    fn no_dangling_instances(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let mut sim = Sim::new(3);
        for op in &ops {
            sim.apply(op);
            for (_, record) in sim.registry.instances() {
                prop_assert!(sim.registry.agent(&record.agent_id).is_some());
            }
        }
    }

    /// Instance counts per agent never differ by more than one after a
    /// scale-up from an empty fleet.
    #[test]
    fn fresh_scale_up_is_balanced(agents in 1u8..4, desired in 0u32..12) {
        let mut sim = Sim::new(0);
        for n in 0..agents {
            sim.apply(&Op::Connect(n));
        }
        sim.apply(&Op::ScaleUp(desired));

        let loads: Vec<usize> = sim.registry.loads().into_values().collect();
        let max = loads.iter().copied().max().unwrap_or(0);
        let min = loads.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1);
        prop_assert_eq!(sim.registry.total_instance_count(), desired as usize);
    }
}

#[test]
fn cascade_on_loss_runs_single_pass() {
    let mut sim = Sim::new(3);
    sim.apply(&Op::Connect(0));
    sim.apply(&Op::Tick);
    assert_eq!(sim.registry.agent_load(&Sim::agent(0)), 3);

    let before = sim.passes;
    sim.apply(&Op::Disconnect(0));
    assert_eq!(sim.passes - before, 1);
    assert_eq!(sim.registry.total_instance_count(), 0);
}

#[test]
fn scenario_two_agents_join_late() {
    let mut sim = Sim::new(3);
    sim.apply(&Op::Tick);
    assert_eq!(sim.registry.total_instance_count(), 0);

    sim.apply(&Op::Connect(0));
    sim.apply(&Op::Connect(1));
    sim.apply(&Op::Tick);

    let loads = sim.registry.loads();
    let mut counts: Vec<usize> = loads.into_values().collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2]);
}

#[test]
fn scenario_scale_down_is_immediate() {
    let mut sim = Sim::new(5);
    sim.apply(&Op::Connect(0));
    sim.apply(&Op::Tick);
    assert_eq!(sim.registry.total_instance_count(), 5);

    sim.desired.scale_down(2);
    reconcile(&mut sim.registry, sim.desired);
    // Before any stopped report is delivered.
    assert_eq!(sim.registry.total_instance_count(), 3);
}
