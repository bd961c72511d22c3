//! Piecewise-linear envelopes
//!
//! Envelopes map a nonnegative x (usually seconds or a unitless phase) to
//! a value by linear interpolation between breakpoint nodes. Optional loop
//! marks let sustain segments repeat until release.

/// A breakpoint envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    nodes: Vec<(f64, f64)>,
    loop_start: Option<usize>,
    loop_end: Option<usize>,
}

impl Envelope {
    /// Build from nodes; x coordinates must be strictly increasing.
    pub fn from_nodes(nodes: Vec<(f64, f64)>) -> Result<Self, String> {
        if nodes.len() < 2 {
            return Err("envelope needs at least two nodes".to_string());
        }
        for pair in nodes.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err("envelope x coordinates must be strictly increasing".to_string());
            }
        }
        Ok(Envelope {
            nodes,
            loop_start: None,
            loop_end: None,
        })
    }

    /// Parse the serialized form:
    /// `{"nodes": [[x, y], ...], "marks": [loop_start, loop_end]}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, String> {
        let obj = json.as_object().ok_or("envelope must be an object")?;
        let node_list = obj
            .get("nodes")
            .and_then(|n| n.as_array())
            .ok_or("envelope is missing nodes")?;

        let mut nodes = Vec::with_capacity(node_list.len());
        for entry in node_list {
            let pair = entry.as_array().ok_or("envelope node must be a pair")?;
            if pair.len() != 2 {
                return Err("envelope node must be a pair".to_string());
            }
            let x = pair[0].as_f64().ok_or("envelope node x must be a number")?;
            let y = pair[1].as_f64().ok_or("envelope node y must be a number")?;
            if !x.is_finite() || !y.is_finite() {
                return Err("envelope node values must be finite".to_string());
            }
            nodes.push((x, y));
        }

        let mut env = Envelope::from_nodes(nodes)?;

        if let Some(marks) = obj.get("marks").and_then(|m| m.as_array()) {
            if marks.len() != 2 {
                return Err("envelope marks must be a pair".to_string());
            }
            let start = marks[0].as_u64().ok_or("loop mark must be an index")? as usize;
            let end = marks[1].as_u64().ok_or("loop mark must be an index")? as usize;
            env.set_loop(start, end)?;
        }

        Ok(env)
    }

    pub fn set_loop(&mut self, start: usize, end: usize) -> Result<(), String> {
        if start > end || end >= self.nodes.len() {
            return Err("envelope loop marks out of range".to_string());
        }
        self.loop_start = Some(start);
        self.loop_end = Some(end);
        Ok(())
    }

    pub fn nodes(&self) -> &[(f64, f64)] {
        &self.nodes
    }

    pub fn loop_marks(&self) -> Option<(usize, usize)> {
        Some((self.loop_start?, self.loop_end?))
    }

    /// The x coordinate of the last node.
    pub fn end_x(&self) -> f64 {
        self.nodes.last().map(|n| n.0).unwrap_or(0.0)
    }

    /// Evaluate at `x`, clamping outside the node range.
    pub fn value_at(&self, x: f64) -> f64 {
        let first = self.nodes[0];
        if x <= first.0 {
            return first.1;
        }
        let last = *self.nodes.last().expect("envelope has nodes");
        if x >= last.0 {
            return last.1;
        }

        let next = self
            .nodes
            .partition_point(|node| node.0 <= x)
            .min(self.nodes.len() - 1);
        let (x0, y0) = self.nodes[next - 1];
        let (x1, y1) = self.nodes[next];
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}
