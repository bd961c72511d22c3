//! The mixed-signal execution plan
//!
//! One global plan covers everything that renders once per chunk: mixed
//! processors, audio-unit interfaces, and the master output. The build
//! walks the master graph depth-first; entering an audio unit recurses
//! through its output interface, inner graph and input interface, with
//! the interfaces as explicit copy tasks so that bypass can reroute
//! around the unit body. Tasks are sorted by level, deepest first, and
//! tasks with no inputs are dropped.

use crate::composition::{Composition, DeviceKind};
use crate::connections::{Connections, NodeKind};
use crate::device::SignalType;
use crate::device_state::{DeviceStates, MixedBank, MixedState};
use crate::work_buffer::WorkBuffers;
use crate::DEVICE_PORTS_MAX;

/// One mixed-buffer connection between two devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixedConn {
    pub recv_dev: usize,
    pub recv_bank: MixedBank,
    pub recv_port: usize,
    pub send_dev: usize,
    pub send_bank: MixedBank,
    pub send_port: usize,
}

/// One step of the mixed plan.
#[derive(Debug)]
pub struct MixedTask {
    pub device: usize,
    pub level: i32,
    pub conns: Vec<MixedConn>,
    /// Audio unit device whose bypass flag gates this task; for the
    /// unit's own task this is the unit itself.
    pub container: Option<usize>,
    /// Connections that reroute the unit input straight to its output
    /// when the container is bypassed. Master-level units only.
    pub bypass_conns: Vec<MixedConn>,
}

#[derive(Debug, Default)]
pub struct MixedPlan {
    tasks: Vec<MixedTask>,
}

impl MixedPlan {
    /// Compile the mixed plan from the composition's master graph.
    pub fn build(comp: &Composition) -> MixedPlan {
        let mut plan = MixedPlan { tasks: Vec::new() };
        plan.build_from_node(
            comp,
            comp.connections(),
            None,
            comp.connections().master(),
            0,
            None,
        );
        plan.finalize();
        plan
    }

    pub fn tasks(&self) -> &[MixedTask] {
        &self.tasks
    }

    fn task_index(&self, device: usize) -> Option<usize> {
        self.tasks.iter().position(|t| t.device == device)
    }

    fn create_or_get_task(&mut self, device: usize, level: i32) -> (usize, bool) {
        if let Some(index) = self.task_index(device) {
            self.tasks[index].level = self.tasks[index].level.max(level);
            return (index, false);
        }
        self.tasks.push(MixedTask {
            device,
            level,
            conns: Vec::new(),
            container: None,
            bypass_conns: Vec::new(),
        });
        (self.tasks.len() - 1, true)
    }

    /// Resolve a graph node to its flat device id. Mixed processing sees
    /// every node except voice processors, which contribute through their
    /// own mixed send buffers without a task.
    fn node_device(
        comp: &Composition,
        scope: Option<usize>,
        conns: &Connections,
        node_index: usize,
    ) -> Option<(usize, bool)> {
        let node = conns.node(node_index);
        match (scope, node.kind) {
            (None, NodeKind::Master) => Some((crate::composition::MASTER_DEVICE, false)),
            (Some(au), NodeKind::Master) => {
                comp.au_device_ids(au).map(|ids| (ids.output, false))
            }
            (Some(au), NodeKind::InputInterface) => {
                comp.au_device_ids(au).map(|ids| (ids.input, false))
            }
            (None, NodeKind::InputInterface) => None,
            (_, NodeKind::AudioUnit(au)) => comp.au_device_ids(au).map(|ids| (ids.unit, false)),
            (Some(au), NodeKind::Processor(p)) => {
                let unit = comp.audio_unit(au)?;
                let proc = unit.processor(p)?;
                let device = comp.au_device_ids(au)?.procs[p]?;
                Some((device, proc.signal_type == SignalType::Voice))
            }
            (None, NodeKind::Processor(_)) => None,
        }
    }

    /// Walk one node of graph `conns` (scope = the audio unit owning the
    /// graph, `None` for the master graph).
    #[allow(clippy::too_many_arguments)]
    fn build_from_node(
        &mut self,
        comp: &Composition,
        conns: &Connections,
        scope: Option<usize>,
        node_index: usize,
        level: i32,
        container: Option<usize>,
    ) {
        let Some((device, is_voice_proc)) = Self::node_device(comp, scope, conns, node_index)
        else {
            return;
        };
        if is_voice_proc {
            // Voice processors contribute via their mixed send buffers;
            // the receiving task mixes from them directly.
            return;
        }

        let (task_index, is_new) = self.create_or_get_task(device, level);
        if is_new {
            self.tasks[task_index].container = container;
        }

        let node = conns.node(node_index);
        let mut recv_task_index = task_index;
        let mut recv_device = device;
        let mut recv_bank = MixedBank::Recv;
        let mut cur_depth = 1;

        if let NodeKind::AudioUnit(au) = node.kind {
            let Some(unit) = comp.audio_unit(au) else {
                return;
            };
            let Some(ids) = comp.au_device_ids(au) else {
                return;
            };
            let inner = &unit.connections;
            let inner_depth = inner.depth() as i32;
            let sub_container = container.unwrap_or(ids.unit);

            // The unit task copies its output interface's receive buffers
            // to the unit's send buffers.
            if is_new {
                self.tasks[task_index].container = Some(sub_container);
                for port in 0..DEVICE_PORTS_MAX {
                    if node.send[port].is_empty() {
                        continue;
                    }
                    if inner.node(inner.master()).recv[port].is_empty() {
                        continue;
                    }
                    self.tasks[task_index].conns.push(MixedConn {
                        recv_dev: ids.unit,
                        recv_bank: MixedBank::Send,
                        recv_port: port,
                        send_dev: ids.output,
                        send_bank: MixedBank::Recv,
                        send_port: port,
                    });
                }
            }

            // The unit body.
            self.build_from_node(comp, inner, Some(au), inner.master(), level + 1, Some(sub_container));

            // The input interface task runs before the unit body; outer
            // senders mix straight into the interface's send buffers,
            // where inner processors read them.
            let (in_task, in_is_new) =
                self.create_or_get_task(ids.input, level + inner_depth + 1);
            if in_is_new {
                self.tasks[in_task].container = container;
            }

            if is_new && container.is_none() {
                // Master-level bypass: route the unit input straight to
                // the unit output.
                for port in 0..DEVICE_PORTS_MAX {
                    if node.recv[port].is_empty() || node.send[port].is_empty() {
                        continue;
                    }
                    self.tasks[task_index].bypass_conns.push(MixedConn {
                        recv_dev: ids.unit,
                        recv_bank: MixedBank::Send,
                        recv_port: port,
                        send_dev: ids.input,
                        send_bank: MixedBank::Send,
                        send_port: port,
                    });
                }
            }

            // Senders into the unit feed the input interface's send side.
            recv_task_index = in_task;
            recv_device = ids.input;
            recv_bank = MixedBank::Send;
            cur_depth = inner_depth + 2;
        }

        for port in 0..DEVICE_PORTS_MAX {
            let edges = conns.node(node_index).recv[port].clone();
            for edge in edges {
                self.build_from_node(
                    comp,
                    conns,
                    scope,
                    edge.node,
                    level + cur_depth,
                    container,
                );

                let Some((send_dev, _)) = Self::node_device(comp, scope, conns, edge.node)
                else {
                    continue;
                };

                let conn = MixedConn {
                    recv_dev: recv_device,
                    recv_bank,
                    recv_port: port,
                    send_dev,
                    send_bank: MixedBank::Send,
                    send_port: edge.port,
                };
                let task = &mut self.tasks[recv_task_index];
                if !task.conns.contains(&conn) {
                    task.conns.push(conn);
                }
            }
        }
    }

    /// Sort deepest first and drop tasks that move no data.
    fn finalize(&mut self) {
        self.tasks.sort_by(|a, b| b.level.cmp(&a.level));
        self.tasks
            .retain(|task| !task.conns.is_empty() || !task.bypass_conns.is_empty());
    }

    /// Run every task in plan order for one chunk.
    pub fn execute(
        &self,
        comp: &Composition,
        states: &mut DeviceStates,
        wbs: &mut WorkBuffers,
        audio_rate: u32,
        tempo: f64,
        frame_count: usize,
    ) {
        if frame_count == 0 {
            return;
        }

        for task in &self.tasks {
            // Bypass check against the containing unit's state.
            if let Some(container) = task.container {
                let bypassed = matches!(
                    &states.get(container).mixed_state,
                    MixedState::Au(au_state) if au_state.bypass
                );
                if bypassed {
                    for conn in &task.bypass_conns {
                        mix_conn(states, conn, frame_count);
                    }
                    continue;
                }
            }

            for conn in &task.conns {
                mix_conn(states, conn, frame_count);
            }

            if let DeviceKind::Processor { au, proc } = comp.device_kind(task.device) {
                if let Some(processor) =
                    comp.audio_unit(au).and_then(|unit| unit.processor(proc))
                {
                    let (mixed_state, dts) = states.get_mut(task.device).mixed_and_thread_mut(0);
                    processor.imp.render_mixed(
                        mixed_state,
                        dts,
                        wbs,
                        audio_rate,
                        tempo,
                        frame_count,
                    );
                }
            }
        }
    }
}

fn mix_conn(states: &mut DeviceStates, conn: &MixedConn, frame_count: usize) {
    let (recv_state, send_state) = states.get_pair_mut(conn.recv_dev, conn.send_dev);
    let send_ts = send_state.thread(0);
    let recv_ts = recv_state.thread_mut(0);
    let (Some(send_buf), Some(recv_buf)) = (
        send_ts.mixed_buf(conn.send_bank, conn.send_port),
        recv_ts.mixed_buf_mut(conn.recv_bank, conn.recv_port),
    ) else {
        return;
    };
    recv_buf.mix_from(send_buf, 0, frame_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::MemStore;

    fn effect_chain_store() -> MemStore {
        let mut store = MemStore::new();
        store.put_json(
            "p_connections.json",
            r#"[
                ["au_00/out_00", "au_01/in_00"],
                ["au_01/out_00", "out_00"]
            ]"#,
        );
        store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
        store.put_json(
            "au_00/p_connections.json",
            r#"[["proc_00/out_00", "out_00"]]"#,
        );
        store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "add"}"#);
        store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);

        store.put_json("au_01/p_manifest.json", r#"{"type": "effect"}"#);
        store.put_json(
            "au_01/p_connections.json",
            r#"[
                ["in_00", "proc_00/in_00"],
                ["proc_00/out_00", "out_00"]
            ]"#,
        );
        store.put_json("au_01/proc_00/p_manifest.json", r#"{"type": "filter"}"#);
        store.put_json("au_01/proc_00/p_signal_type.json", r#""mixed""#);
        store
    }

    #[test]
    fn test_senders_run_before_receivers() {
        let comp = Composition::build(&effect_chain_store()).unwrap();
        let plan = MixedPlan::build(&comp);

        // Every connection's sender task (if it has one) must appear at
        // or before the receiving task.
        for (index, task) in plan.tasks().iter().enumerate() {
            for conn in &task.conns {
                if let Some(sender_index) =
                    plan.tasks().iter().position(|t| t.device == conn.send_dev)
                {
                    assert!(
                        sender_index <= index,
                        "sender task {sender_index} runs after receiver {index}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_master_task_present_and_last_levels() {
        let comp = Composition::build(&effect_chain_store()).unwrap();
        let plan = MixedPlan::build(&comp);
        let master = plan
            .tasks()
            .iter()
            .position(|t| t.device == crate::composition::MASTER_DEVICE)
            .expect("master task exists");
        assert_eq!(master, plan.tasks().len() - 1);
    }

    #[test]
    fn test_master_level_unit_has_bypass_conns() {
        let comp = Composition::build(&effect_chain_store()).unwrap();
        let plan = MixedPlan::build(&comp);
        let ids = comp.au_device_ids(1).unwrap();
        let unit_task = plan
            .tasks()
            .iter()
            .find(|t| t.device == ids.unit)
            .expect("unit task exists");
        assert_eq!(unit_task.container, Some(ids.unit));
        assert_eq!(unit_task.bypass_conns.len(), 1);
        assert_eq!(unit_task.bypass_conns[0].send_dev, ids.input);
    }
}
