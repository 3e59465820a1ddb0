//! The replica reconciliation pass.
//!
//! A pass reads the desired count and the registry's instance count and acts
//! on the difference:
//!
//! - Too few: send `startService` to the least-loaded agent, once per missing
//!   replica. The registry is NOT updated; the instance only appears once its
//!   agent reports it, so a short under-count after a pass is expected.
//! - Too many: send `stopService` for the first instances in registry order
//!   and remove them from the registry immediately. The later `stopped` report
//!   from the agent is then a no-op.
//!
//! Nothing is acknowledged or retried individually; the next pass re-evaluates
//! from scratch.

use fleet_id::{AgentId, ServiceId};
use fleet_proto::ControllerCommand;
use tracing::{debug, info, warn};

use crate::desired::DesiredReplicas;
use crate::registry::FleetRegistry;
use crate::scheduler::Scheduler;
use crate::sender::CommandSender;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub desired: usize,
    /// Registry instance count when the pass started.
    pub actual: usize,
    pub starts_sent: usize,
    pub stops_sent: usize,
    /// Instances dropped because their agent was no longer registered.
    pub orphans_dropped: usize,
    /// Commands that could not be queued on a closed link.
    pub send_failures: usize,
    /// Scale-up stopped early because no agent was available.
    pub deferred: bool,
}

impl ReconcileStats {
    /// True if the pass changed anything.
    pub fn acted(&self) -> bool {
        self.starts_sent > 0 || self.stops_sent > 0 || self.orphans_dropped > 0
    }
}

/// Run one full reconciliation pass.
pub fn reconcile<L: CommandSender>(
    registry: &mut FleetRegistry<L>,
    desired: DesiredReplicas,
) -> ReconcileStats {
    let desired = desired.get() as usize;
    let actual = registry.total_instance_count();

    let mut stats = ReconcileStats {
        desired,
        actual,
        ..Default::default()
    };

    if actual < desired {
        scale_up(registry, desired - actual, &mut stats);
    } else if actual > desired {
        scale_down(registry, actual - desired, &mut stats);
    }

    if stats.acted() {
        info!(
            desired = stats.desired,
            actual = stats.actual,
            starts_sent = stats.starts_sent,
            stops_sent = stats.stops_sent,
            orphans_dropped = stats.orphans_dropped,
            "Reconciliation pass complete"
        );
    } else {
        debug!(desired, actual, "Reconciliation pass made no changes");
    }

    stats
}

fn scale_up<L: CommandSender>(
    registry: &FleetRegistry<L>,
    missing: usize,
    stats: &mut ReconcileStats,
) {
    let mut scheduler = Scheduler::new();

    for _ in 0..missing {
        let Some(agent_id) = scheduler.pick_agent(registry) else {
            warn!(
                missing = missing - stats.starts_sent,
                "No agents available to start service, deferring to next pass"
            );
            stats.deferred = true;
            break;
        };

        // Reserve even if the send fails; the next pick skips a dead link.
        scheduler.reserve(&agent_id);

        let Some(entry) = registry.agent(&agent_id) else {
            continue;
        };

        match entry.link().send(ControllerCommand::StartService) {
            Ok(()) => {
                debug!(agent_id = %agent_id, "Start request sent");
                stats.starts_sent += 1;
            }
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Failed to send start request");
                stats.send_failures += 1;
            }
        }
    }
}

fn scale_down<L: CommandSender>(
    registry: &mut FleetRegistry<L>,
    excess: usize,
    stats: &mut ReconcileStats,
) {
    let victims: Vec<(ServiceId, AgentId)> = registry
        .instances()
        .take(excess)
        .map(|(service_id, record)| (service_id.clone(), record.agent_id.clone()))
        .collect();

    for (service_id, agent_id) in victims {
        match registry.agent(&agent_id) {
            Some(entry) => {
                let command = ControllerCommand::StopService {
                    service_id: service_id.clone(),
                };
                match entry.link().send(command) {
                    Ok(()) => {
                        debug!(service_id = %service_id, agent_id = %agent_id, "Stop request sent");
                        stats.stops_sent += 1;
                    }
                    Err(e) => {
                        warn!(
                            service_id = %service_id,
                            agent_id = %agent_id,
                            error = %e,
                            "Failed to send stop request"
                        );
                        stats.send_failures += 1;
                    }
                }
            }
            None => {
                info!(
                    service_id = %service_id,
                    agent_id = %agent_id,
                    "Agent unavailable, dropping service"
                );
                stats.orphans_dropped += 1;
            }
        }

        registry.remove_instance(&service_id);
    }
}

/// Result of handling a closed agent link.
#[derive(Debug)]
pub struct AgentLoss {
    /// Instances removed with the agent.
    pub lost: Vec<ServiceId>,
    /// The pass that ran immediately after the removal.
    pub stats: ReconcileStats,
}

/// Handle the close of `agent_id`'s link opened as `connection`: unregister
/// it (cascading to its instances) and run a full pass right away.
///
/// Returns `None` without running a pass if the agent is not registered under
/// that connection.
pub fn agent_lost<L: CommandSender>(
    registry: &mut FleetRegistry<L>,
    agent_id: &AgentId,
    connection: u64,
    desired: DesiredReplicas,
) -> Option<AgentLoss> {
    let removed = registry.unregister_connection(agent_id, connection)?;

    for service_id in &removed.lost {
        info!(service_id = %service_id, agent_id = %agent_id, "Service lost with agent");
    }

    let stats = reconcile(registry, desired);
    Some(AgentLoss {
        lost: removed.lost,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::Utc;
    use fleet_proto::ServiceState;

    use super::*;
    use crate::sender::SendError;

    type Outbox = Rc<RefCell<Vec<(AgentId, ControllerCommand)>>>;

    /// Link that records every command into a shared outbox.
    struct RecordingLink {
        agent_id: AgentId,
        outbox: Outbox,
        closed: bool,
    }

    impl CommandSender for RecordingLink {
        fn send(&self, command: ControllerCommand) -> Result<(), SendError> {
            if self.closed {
                return Err(SendError);
            }
            self.outbox
                .borrow_mut()
                .push((self.agent_id.clone(), command));
            Ok(())
        }
    }

    struct Harness {
        registry: FleetRegistry<RecordingLink>,
        outbox: Outbox,
        next_connection: u64,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: FleetRegistry::new(),
                outbox: Rc::default(),
                next_connection: 0,
            }
        }

        fn connect(&mut self, agent: &str) -> u64 {
            self.connect_with(agent, false)
        }

        fn connect_with(&mut self, agent: &str, closed: bool) -> u64 {
            let agent_id = aid(agent);
            self.next_connection += 1;
            let link = RecordingLink {
                agent_id: agent_id.clone(),
                outbox: self.outbox.clone(),
                closed,
            };
            self.registry
                .register_agent(agent_id, link, self.next_connection);
            self.next_connection
        }

        fn report_running(&mut self, agent: &str, n: u64) {
            let agent_id = aid(agent);
            self.registry
                .upsert_instance(
                    ServiceId::for_agent(&agent_id, n),
                    &agent_id,
                    ServiceState::Running {
                        start_time: Utc::now(),
                    },
                )
                .unwrap();
        }

        fn take_sent(&self) -> Vec<(AgentId, ControllerCommand)> {
            std::mem::take(&mut *self.outbox.borrow_mut())
        }
    }

    fn aid(s: &str) -> AgentId {
        s.parse().unwrap()
    }

    fn starts_per_agent(sent: &[(AgentId, ControllerCommand)]) -> Vec<(String, usize)> {
        let mut counts = std::collections::BTreeMap::<String, usize>::new();
        for (agent, command) in sent {
            if *command == ControllerCommand::StartService {
                *counts.entry(agent.to_string()).or_default() += 1;
            }
        }
        counts.into_iter().collect()
    }

    #[test]
    fn test_converged_pass_sends_nothing() {
        let mut h = Harness::new();
        h.connect("A");
        h.report_running("A", 1);

        let stats = reconcile(&mut h.registry, DesiredReplicas::new(1));
        assert!(!stats.acted());
        assert!(h.take_sent().is_empty());
    }

    #[test]
    fn test_no_agents_defers_without_side_effects() {
        let mut h = Harness::new();
        let stats = reconcile(&mut h.registry, DesiredReplicas::new(3));

        assert!(stats.deferred);
        assert_eq!(stats.starts_sent, 0);
        assert_eq!(h.registry.total_instance_count(), 0);
        assert!(h.take_sent().is_empty());
    }

    #[test]
    fn test_scale_up_from_zero_spreads_across_two_agents() {
        let mut h = Harness::new();
        h.connect("A");
        h.connect("B");

        let stats = reconcile(&mut h.registry, DesiredReplicas::new(3));
        assert_eq!(stats.starts_sent, 3);

        let sent = h.take_sent();
        assert_eq!(
            starts_per_agent(&sent),
            vec![("A".to_string(), 2), ("B".to_string(), 1)]
        );
        // Starts are not recorded until the agents report back.
        assert_eq!(h.registry.total_instance_count(), 0);
    }

    #[test]
    fn test_scale_up_prefers_least_loaded() {
        let mut h = Harness::new();
        h.connect("A");
        h.connect("B");
        h.connect("C");
        h.report_running("A", 1);
        h.report_running("A", 2);
        h.report_running("B", 1);
        h.report_running("C", 1);

        reconcile(&mut h.registry, DesiredReplicas::new(5));
        let sent = h.take_sent();
        assert_eq!(sent, vec![(aid("B"), ControllerCommand::StartService)]);
    }

    #[test]
    fn test_unsent_start_is_retried_next_pass() {
        let mut h = Harness::new();
        h.connect("A");

        reconcile(&mut h.registry, DesiredReplicas::new(1));
        assert_eq!(h.take_sent().len(), 1);

        // The agent never reported: the next pass asks again.
        reconcile(&mut h.registry, DesiredReplicas::new(1));
        assert_eq!(
            h.take_sent(),
            vec![(aid("A"), ControllerCommand::StartService)]
        );
    }

    #[test]
    fn test_scale_down_removes_eagerly() {
        let mut h = Harness::new();
        h.connect("A");
        h.connect("B");
        for n in 1..=3 {
            h.report_running("A", n);
        }
        h.report_running("B", 1);
        h.report_running("B", 2);

        let stats = reconcile(&mut h.registry, DesiredReplicas::new(3));
        assert_eq!(stats.stops_sent, 2);
        assert_eq!(h.registry.total_instance_count(), 3);

        let sent = h.take_sent();
        assert_eq!(
            sent,
            vec![
                (
                    aid("A"),
                    ControllerCommand::StopService {
                        service_id: "A-service-1".parse().unwrap()
                    }
                ),
                (
                    aid("A"),
                    ControllerCommand::StopService {
                        service_id: "A-service-2".parse().unwrap()
                    }
                ),
            ]
        );

        // The agent's own stopped report arrives later and changes nothing.
        let outcome = h
            .registry
            .upsert_instance(
                "A-service-1".parse().unwrap(),
                &aid("A"),
                ServiceState::Stopped,
            )
            .unwrap();
        assert_eq!(outcome, crate::UpsertOutcome::Absent);
        assert_eq!(h.registry.total_instance_count(), 3);
    }

    #[test]
    fn test_scale_down_to_zero() {
        let mut h = Harness::new();
        h.connect("A");
        h.report_running("A", 1);
        h.report_running("A", 2);

        let stats = reconcile(&mut h.registry, DesiredReplicas::new(0));
        assert_eq!(stats.stops_sent, 2);
        assert_eq!(h.registry.total_instance_count(), 0);
    }

    #[test]
    fn test_failed_sends_are_counted() {
        let mut h = Harness::new();
        h.connect_with("A", true);

        let stats = reconcile(&mut h.registry, DesiredReplicas::new(2));
        assert_eq!(stats.starts_sent, 0);
        assert_eq!(stats.send_failures, 2);
        assert!(!stats.deferred);
    }

    #[test]
    fn test_agent_loss_cascades_and_reconverges() {
        let mut h = Harness::new();
        let conn_a = h.connect("A");
        h.connect("B");
        for n in 1..=3 {
            h.report_running("A", n);
        }
        h.report_running("B", 1);

        let loss = agent_lost(&mut h.registry, &aid("A"), conn_a, DesiredReplicas::new(4))
            .expect("agent was registered");

        assert_eq!(loss.lost.len(), 3);
        assert_eq!(loss.stats.actual, 1);
        assert_eq!(loss.stats.starts_sent, 3);
        assert!(h
            .take_sent()
            .iter()
            .all(|(agent, cmd)| agent == &aid("B") && *cmd == ControllerCommand::StartService));
    }

    #[test]
    fn test_agent_loss_for_stale_connection_runs_no_pass() {
        let mut h = Harness::new();
        let old = h.connect("A");
        h.connect("A");

        assert!(agent_lost(&mut h.registry, &aid("A"), old, DesiredReplicas::new(2)).is_none());
        assert!(h.take_sent().is_empty());
        assert_eq!(h.registry.agent_count(), 1);
    }
}
