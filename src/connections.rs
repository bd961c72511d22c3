//! Device connection graphs
//!
//! A connection graph wires device ports into a signal-flow DAG. Nodes
//! live in an arena and edges carry indices, so the graph is freely
//! shareable after build. The same structure describes both the master
//! graph (audio units and the master output) and the inner graph of an
//! audio unit (processors between the unit's input and output
//! interfaces).
//!
//! Serialized form: a list of `[sender, receiver]` endpoint pairs, e.g.
//! `[["proc_00/out_00", "proc_01/in_00"], ["proc_01/out_00", "out_00"]]`.
//! A bare `out_XX` names the graph's master output; a bare `in_XX` names
//! the input interface (audio unit graphs only).

use crate::DEVICE_PORTS_MAX;

/// Cycle-check coloring state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Reached,
    Visited,
}

/// What a graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The graph output (the composition master, or an audio unit's
    /// output interface).
    Master,
    /// An audio unit's input interface; its `in_XX` ports act as senders
    /// inside the unit graph.
    InputInterface,
    AudioUnit(usize),
    Processor(usize),
}

/// One port-qualified edge endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub node: usize,
    pub port: usize,
}

/// A node in the arena with its receive and send adjacency.
#[derive(Debug, Clone)]
pub struct DeviceNode {
    pub name: String,
    pub kind: NodeKind,
    /// Per receive port: the senders feeding it.
    pub recv: Vec<Vec<Edge>>,
    /// Per send port: the receivers it feeds.
    pub send: Vec<Vec<Edge>>,
}

impl DeviceNode {
    fn new(name: String, kind: NodeKind) -> Self {
        DeviceNode {
            name,
            kind,
            recv: vec![Vec::new(); DEVICE_PORTS_MAX],
            send: vec![Vec::new(); DEVICE_PORTS_MAX],
        }
    }
}

/// An immutable device graph.
#[derive(Debug, Clone)]
pub struct Connections {
    nodes: Vec<DeviceNode>,
    master: usize,
    input_iface: Option<usize>,
}

impl Connections {
    /// Parse a serialized connection list.
    ///
    /// `allow_input_iface` is set for audio unit graphs, where bare
    /// `in_XX` endpoints refer to the unit's input interface.
    pub fn from_json(
        json: &serde_json::Value,
        allow_input_iface: bool,
    ) -> Result<Connections, String> {
        let list = json.as_array().ok_or("connections must be a list")?;

        let mut conns = Connections {
            nodes: vec![DeviceNode::new(String::new(), NodeKind::Master)],
            master: 0,
            input_iface: None,
        };

        for entry in list {
            let pair = entry.as_array().ok_or("connection must be a pair")?;
            if pair.len() != 2 {
                return Err("connection must be a pair".to_string());
            }
            let send_str = pair[0].as_str().ok_or("connection endpoint must be a string")?;
            let recv_str = pair[1].as_str().ok_or("connection endpoint must be a string")?;

            let (send_node, send_port) =
                conns.resolve_endpoint(send_str, true, allow_input_iface)?;
            let (recv_node, recv_port) =
                conns.resolve_endpoint(recv_str, false, allow_input_iface)?;

            conns.nodes[recv_node].recv[recv_port].push(Edge {
                node: send_node,
                port: send_port,
            });
            conns.nodes[send_node].send[send_port].push(Edge {
                node: recv_node,
                port: recv_port,
            });
        }

        Ok(conns)
    }

    /// An empty graph with only the master node; renders silence.
    pub fn empty() -> Connections {
        Connections {
            nodes: vec![DeviceNode::new(String::new(), NodeKind::Master)],
            master: 0,
            input_iface: None,
        }
    }

    fn resolve_endpoint(
        &mut self,
        endpoint: &str,
        is_sender: bool,
        allow_input_iface: bool,
    ) -> Result<(usize, usize), String> {
        let (device, port_str) = match endpoint.rsplit_once('/') {
            Some((device, port)) => (Some(device), port),
            None => (None, endpoint),
        };

        let port = parse_port(port_str)
            .ok_or_else(|| format!("bad port in connection endpoint: {endpoint}"))?;

        match device {
            None => {
                // Bare endpoints address the graph boundary.
                if port_str.starts_with("out_") {
                    if is_sender {
                        return Err(format!("master output cannot send: {endpoint}"));
                    }
                    Ok((self.master, port))
                } else if allow_input_iface {
                    if !is_sender {
                        return Err(format!("input interface cannot receive: {endpoint}"));
                    }
                    let node = match self.input_iface {
                        Some(index) => index,
                        None => {
                            let index = self.nodes.len();
                            self.nodes
                                .push(DeviceNode::new("in".to_string(), NodeKind::InputInterface));
                            self.input_iface = Some(index);
                            index
                        }
                    };
                    Ok((node, port))
                } else {
                    Err(format!("unexpected graph boundary endpoint: {endpoint}"))
                }
            }
            Some(name) => {
                let expected = if is_sender { "out_" } else { "in_" };
                if !port_str.starts_with(expected) {
                    return Err(format!("wrong port direction in endpoint: {endpoint}"));
                }
                let kind = parse_device_name(name)
                    .ok_or_else(|| format!("unknown device in endpoint: {endpoint}"))?;
                Ok((self.intern_node(name, kind), port))
            }
        }
    }

    fn intern_node(&mut self, name: &str, kind: NodeKind) -> usize {
        if let Some(index) = self.nodes.iter().position(|n| n.name == name) {
            return index;
        }
        self.nodes.push(DeviceNode::new(name.to_string(), kind));
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[DeviceNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &DeviceNode {
        &self.nodes[index]
    }

    pub fn master(&self) -> usize {
        self.master
    }

    pub fn input_iface(&self) -> Option<usize> {
        self.input_iface
    }

    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Detect cycles with a three-color depth-first search.
    ///
    /// Returns the name of a node on a cycle, if any. Every node is used
    /// as a root so cycles disconnected from the master are caught too.
    pub fn check_cycles(&self) -> Result<(), String> {
        let mut marks = vec![Mark::New; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if marks[start] == Mark::New {
                self.visit(start, &mut marks)?;
            }
        }
        Ok(())
    }

    fn visit(&self, node: usize, marks: &mut [Mark]) -> Result<(), String> {
        match marks[node] {
            Mark::Reached => return Err(self.nodes[node].name.clone()),
            Mark::Visited => return Ok(()),
            Mark::New => {}
        }
        marks[node] = Mark::Reached;
        for port in &self.nodes[node].recv {
            for edge in port {
                self.visit(edge.node, marks)?;
            }
        }
        marks[node] = Mark::Visited;
        Ok(())
    }

    /// Longest receive path ending at the master, in nodes.
    pub fn depth(&self) -> usize {
        let mut memo = vec![usize::MAX; self.nodes.len()];
        self.depth_of(self.master, &mut memo)
    }

    fn depth_of(&self, node: usize, memo: &mut [usize]) -> usize {
        if memo[node] != usize::MAX {
            return memo[node];
        }
        let mut deepest = 0;
        for port in &self.nodes[node].recv {
            for edge in port {
                deepest = deepest.max(self.depth_of(edge.node, memo));
            }
        }
        memo[node] = deepest + 1;
        deepest + 1
    }
}

fn parse_port(port_str: &str) -> Option<usize> {
    let digits = port_str
        .strip_prefix("in_")
        .or_else(|| port_str.strip_prefix("out_"))?;
    if digits.len() != 2 {
        return None;
    }
    let port = usize::from_str_radix(digits, 16).ok()?;
    (port < DEVICE_PORTS_MAX).then_some(port)
}

fn parse_device_name(name: &str) -> Option<NodeKind> {
    if let Some(digits) = name.strip_prefix("au_") {
        let index = usize::from_str_radix(digits, 16).ok()?;
        return Some(NodeKind::AudioUnit(index));
    }
    if let Some(digits) = name.strip_prefix("proc_") {
        let index = usize::from_str_radix(digits, 16).ok()?;
        return Some(NodeKind::Processor(index));
    }
    None
}
