//! Per-voice execution plans
//!
//! Each audio unit compiles its inner connection graph into a voice plan:
//! an ordered task list covering only the unit's voice-signal processors.
//! A task records its sender tasks, the voice-buffer connections feeding
//! its receive ports, and whether its output crosses into mixed
//! processing. Tasks are stored senders-first; roots (tasks feeding the
//! mixed graph) drive execution and recursively pull any sender that has
//! not run yet this chunk.

use crate::composition::Composition;
use crate::connections::NodeKind;
use crate::device::SignalType;
use crate::device_state::DeviceStates;
use crate::tuning::TuningTable;
use crate::voice::process_voice;
use crate::voice_pool::VoicePool;
use crate::work_buffer::WorkBuffers;

/// One voice-buffer connection: receiver's voice receive port fed by a
/// sender's voice send port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConn {
    pub recv_dev: usize,
    pub recv_port: usize,
    pub send_dev: usize,
    pub send_port: usize,
}

/// One voice-signal processor in the plan.
#[derive(Debug)]
pub struct VoiceTask {
    /// Flat device id of the processor.
    pub device: usize,
    pub au: usize,
    pub proc: usize,
    pub senders: Vec<u16>,
    pub conns: Vec<VoiceConn>,
    pub is_connected_to_mixed: bool,
    is_processed: bool,
}

/// The compiled voice plan of one audio unit.
#[derive(Debug)]
pub struct VoicePlan {
    pub au: usize,
    tasks: Vec<VoiceTask>,
    roots: Vec<u16>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    Visited,
}

impl VoicePlan {
    /// Compile the voice plan for audio unit `au_index`.
    pub fn build(comp: &Composition, au_index: usize) -> VoicePlan {
        let mut plan = VoicePlan {
            au: au_index,
            tasks: Vec::new(),
            roots: Vec::new(),
        };

        let Some(unit) = comp.audio_unit(au_index) else {
            return plan;
        };
        let conns = &unit.connections;
        let mut marks = vec![Mark::New; conns.nodes().len()];

        plan.build_from_node(comp, au_index, conns.master(), true, &mut marks);
        plan.finalize();

        for (index, task) in plan.tasks.iter().enumerate() {
            if task.is_connected_to_mixed {
                plan.roots.push(index as u16);
            }
        }
        plan
    }

    /// Reorder tasks so that every sender precedes its dependents; the
    /// recursion discovers receivers first, so the raw order is reversed.
    fn finalize(&mut self) {
        let count = self.tasks.len();
        let mut order: Vec<u16> = Vec::with_capacity(count);
        let mut visited = vec![false; count];

        fn postorder(tasks: &[VoiceTask], index: u16, visited: &mut [bool], order: &mut Vec<u16>) {
            if visited[index as usize] {
                return;
            }
            visited[index as usize] = true;
            for &sender in &tasks[index as usize].senders {
                postorder(tasks, sender, visited, order);
            }
            order.push(index);
        }

        for index in 0..count as u16 {
            postorder(&self.tasks, index, &mut visited, &mut order);
        }

        let mut new_index = vec![0u16; count];
        for (new, &old) in order.iter().enumerate() {
            new_index[old as usize] = new as u16;
        }

        let mut slots: Vec<Option<VoiceTask>> =
            std::mem::take(&mut self.tasks).into_iter().map(Some).collect();
        for &old in &order {
            let mut task = slots[old as usize].take().expect("each task moved once");
            for sender in &mut task.senders {
                *sender = new_index[*sender as usize];
            }
            self.tasks.push(task);
        }
    }

    /// Walk receive edges depth-first, creating tasks for voice-signal
    /// processors. Returns the node's task index if it got one.
    fn build_from_node(
        &mut self,
        comp: &Composition,
        au_index: usize,
        node_index: usize,
        is_parent_mixed: bool,
        marks: &mut [Mark],
    ) -> Option<u16> {
        let unit = comp.audio_unit(au_index).expect("unit exists during build");
        let node = unit.connections.node(node_index);

        let (use_voice, proc_index) = match node.kind {
            NodeKind::Processor(p) => {
                let is_voice = unit
                    .processor(p)
                    .map(|proc| proc.signal_type == SignalType::Voice)
                    .unwrap_or(false);
                (is_voice, Some(p))
            }
            _ => (false, None),
        };

        if marks[node_index] == Mark::Visited {
            // Only update the mixed flag and report the existing task.
            let device = proc_index
                .and_then(|p| comp.au_device_ids(au_index).and_then(|ids| ids.procs[p]));
            let found = self
                .tasks
                .iter()
                .position(|t| Some(t.device) == device)
                .map(|i| i as u16);
            if let Some(index) = found {
                if is_parent_mixed {
                    self.tasks[index as usize].is_connected_to_mixed = true;
                }
            }
            return found;
        }
        marks[node_index] = Mark::Visited;

        let mut cur_task: Option<u16> = None;
        if use_voice {
            let proc = proc_index.expect("voice nodes are processors");
            if let Some(device) = comp
                .au_device_ids(au_index)
                .and_then(|ids| ids.procs[proc])
            {
                let index = self.tasks.len() as u16;
                self.tasks.push(VoiceTask {
                    device,
                    au: au_index,
                    proc,
                    senders: Vec::new(),
                    conns: Vec::new(),
                    is_connected_to_mixed: is_parent_mixed,
                    is_processed: false,
                });
                cur_task = Some(index);
            }
        }

        for port in 0..node.recv.len() {
            // The borrow of `node` cannot live across the recursion.
            let edges = comp
                .audio_unit(au_index)
                .expect("unit exists during build")
                .connections
                .node(node_index)
                .recv[port]
                .clone();

            for edge in edges {
                let sender_task =
                    self.build_from_node(comp, au_index, edge.node, !use_voice, marks);

                let (Some(cur), Some(sender)) = (cur_task, sender_task) else {
                    continue;
                };

                let sender_dev = self.tasks[sender as usize].device;
                let recv_dev = self.tasks[cur as usize].device;
                let task = &mut self.tasks[cur as usize];
                if !task.senders.contains(&sender) {
                    task.senders.push(sender);
                }
                let conn = VoiceConn {
                    recv_dev,
                    recv_port: port,
                    send_dev: sender_dev,
                    send_port: edge.port,
                };
                if !task.conns.contains(&conn) {
                    task.conns.push(conn);
                }
            }
        }

        cur_task
    }

    pub fn tasks(&self) -> &[VoiceTask] {
        &self.tasks
    }

    pub fn roots(&self) -> &[u16] {
        &self.roots
    }

    /// Render one voice group through the plan.
    ///
    /// Returns the keep-alive bound across all tasks; the group should be
    /// deactivated when it is 0 or when nothing rendered at all.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        comp: &Composition,
        states: &mut DeviceStates,
        thread_id: usize,
        pool: &mut VoicePool,
        group_id: u64,
        tuning: &TuningTable,
        wbs: &mut WorkBuffers,
        audio_rate: u32,
        tempo: f64,
        frame_count: usize,
        enable_mixing: bool,
    ) -> usize {
        for task in &mut self.tasks {
            task.is_processed = false;
            states
                .get_mut(task.device)
                .thread_mut(thread_id)
                .invalidate_voice_buffers();
        }

        // The group lives only while a voice in a task connected to the
        // mixed graph is active going into this chunk; a voice that ends
        // mid-chunk still gets its final frames mixed below.
        let any_root_active = self.roots.iter().any(|&root| {
            let device = self.tasks[root as usize].device;
            pool.find_voice_mut(group_id, device)
                .map(|voice| voice.state.active)
                .unwrap_or(false)
        });
        if !any_root_active {
            pool.deactivate_group(group_id);
            return 0;
        }

        let mut keep_alive = 0;

        for i in 0..self.roots.len() {
            let root = self.roots[i];
            let stop = execute_task(
                &mut self.tasks,
                root,
                comp,
                states,
                thread_id,
                pool,
                group_id,
                tuning,
                wbs,
                audio_rate,
                tempo,
                frame_count,
            );
            keep_alive = keep_alive.max(stop);
        }

        if enable_mixing && keep_alive > 0 {
            for &root in &self.roots {
                let task = &self.tasks[root as usize];
                if task.is_connected_to_mixed {
                    states
                        .get_mut(task.device)
                        .thread_mut(thread_id)
                        .mix_voice_to_mixed(keep_alive);
                }
            }
        }

        keep_alive
    }
}

/// Execute one task after its senders, mixing sender buffers into this
/// task's receive ports.
#[allow(clippy::too_many_arguments)]
fn execute_task(
    tasks: &mut [VoiceTask],
    index: u16,
    comp: &Composition,
    states: &mut DeviceStates,
    thread_id: usize,
    pool: &mut VoicePool,
    group_id: u64,
    tuning: &TuningTable,
    wbs: &mut WorkBuffers,
    audio_rate: u32,
    tempo: f64,
    frame_count: usize,
) -> usize {
    if tasks[index as usize].is_processed {
        return 0;
    }
    tasks[index as usize].is_processed = true;

    let mut keep_alive = 0;

    let senders = tasks[index as usize].senders.clone();
    for sender in senders {
        let stop = execute_task(
            tasks,
            sender,
            comp,
            states,
            thread_id,
            pool,
            group_id,
            tuning,
            wbs,
            audio_rate,
            tempo,
            frame_count,
        );
        keep_alive = keep_alive.max(stop);
    }

    let task = &tasks[index as usize];

    for conn in &task.conns {
        let (recv_state, send_state) = states.get_pair_mut(conn.recv_dev, conn.send_dev);
        let send_ts = send_state.thread(thread_id);
        let recv_ts = recv_state.thread_mut(thread_id);
        let (Some(send_buf), Some(recv_buf)) = (
            send_ts.voice_send(conn.send_port),
            recv_ts.voice_recv_mut(conn.recv_port),
        ) else {
            continue;
        };
        recv_buf.mix_from(send_buf, 0, frame_count);
    }

    let Some(proc) = comp.processor_at(task.device) else {
        return keep_alive;
    };
    let Some(unit) = comp.audio_unit(task.au) else {
        return keep_alive;
    };

    if let Some(voice) = pool.find_voice_mut(group_id, task.device) {
        if voice.state.active {
            let dts = states.get_mut(task.device).thread_mut(thread_id);
            let stop = process_voice(
                proc,
                &unit.params,
                &mut voice.state,
                tuning,
                dts,
                wbs,
                audio_rate,
                tempo,
                frame_count,
            );
            keep_alive = keep_alive.max(stop);
        }
    }

    keep_alive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::MemStore;

    fn chain_store() -> MemStore {
        let mut store = MemStore::new();
        store.put_json("p_connections.json", r#"[["au_00/out_00", "out_00"]]"#);
        store.put_json("au_00/p_manifest.json", r#"{"type": "instrument"}"#);
        store.put_json(
            "au_00/p_connections.json",
            r#"[
                ["proc_00/out_00", "proc_01/in_00"],
                ["proc_01/out_00", "out_00"]
            ]"#,
        );
        store.put_json("au_00/proc_00/p_manifest.json", r#"{"type": "add"}"#);
        store.put_json("au_00/proc_00/p_signal_type.json", r#""voice""#);
        store.put_json("au_00/proc_01/p_manifest.json", r#"{"type": "gain"}"#);
        store.put_json("au_00/proc_01/p_signal_type.json", r#""voice""#);
        store
    }

    #[test]
    fn test_chain_plan_structure() {
        let comp = Composition::build(&chain_store()).unwrap();
        let plan = VoicePlan::build(&comp, 0);

        assert_eq!(plan.tasks().len(), 2);
        // Only the gain feeds the mixed graph.
        let root_devices: Vec<usize> = plan
            .roots()
            .iter()
            .map(|&r| plan.tasks()[r as usize].device)
            .collect();
        let gain_task = plan
            .tasks()
            .iter()
            .find(|t| t.proc == 1)
            .expect("gain task exists");
        assert_eq!(root_devices, vec![gain_task.device]);
        assert!(gain_task.is_connected_to_mixed);
        assert_eq!(gain_task.conns.len(), 1);

        let add_task = plan.tasks().iter().find(|t| t.proc == 0).unwrap();
        assert!(!add_task.is_connected_to_mixed);
    }

    #[test]
    fn test_sender_indices_precede_dependents() {
        let comp = Composition::build(&chain_store()).unwrap();
        let plan = VoicePlan::build(&comp, 0);
        for (index, task) in plan.tasks().iter().enumerate() {
            for &sender in &task.senders {
                assert!(
                    (sender as usize) < index,
                    "sender {sender} does not precede task {index}"
                );
            }
        }
    }

    #[test]
    fn test_parallel_sources_mix_into_one_receiver() {
        let mut store = chain_store();
        store.put_json("au_00/proc_02/p_manifest.json", r#"{"type": "add"}"#);
        store.put_json("au_00/proc_02/p_signal_type.json", r#""voice""#);
        store.put_json(
            "au_00/p_connections.json",
            r#"[
                ["proc_00/out_00", "proc_01/in_00"],
                ["proc_02/out_00", "proc_01/in_00"],
                ["proc_01/out_00", "out_00"]
            ]"#,
        );
        let comp = Composition::build(&store).unwrap();
        let plan = VoicePlan::build(&comp, 0);
        let gain_task = plan.tasks().iter().find(|t| t.proc == 1).unwrap();
        assert_eq!(gain_task.senders.len(), 2);
        assert_eq!(gain_task.conns.len(), 2);
    }
}
