//! Declarative pass scheduling above the command list.
//!
//! Passes declare which textures they read and write; `compile` orders them
//! so every reader runs after the writers of what it reads, and `execute`
//! replays them, synthesizing the state-transition barriers implied by the
//! declarations as it goes.

mod order;

use std::collections::HashMap;

use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::commands::barrier::TextureState;
use crate::device::Device;
use crate::graph::order::DependencyGraph;
use crate::{CommandListHandle, TextureHandle};

type BuildFn = Box<dyn FnMut(u32, u32)>;
type ExecuteFn = Box<dyn FnMut(&mut Device, CommandListHandle)>;

pub struct RenderGraphPass {
    name: String,
    reads: Vec<TextureHandle>,
    writes: Vec<TextureHandle>,
    build_fn: Option<BuildFn>,
    execute_fn: Option<ExecuteFn>,
}

impl RenderGraphPass {
    fn new(name: String) -> Self {
        Self {
            name,
            reads: Vec::new(),
            writes: Vec::new(),
            build_fn: None,
            execute_fn: None,
        }
    }

    /// Declares a texture this pass samples or otherwise reads.
    pub fn read(&mut self, texture: TextureHandle) -> &mut Self {
        self.reads.push(texture);
        self
    }

    /// Declares a texture this pass renders into.
    pub fn write(&mut self, texture: TextureHandle) -> &mut Self {
        self.writes.push(texture);
        self
    }

    /// Called once per compile with the current target dimensions.
    pub fn on_build(&mut self, build_fn: impl FnMut(u32, u32) + 'static) -> &mut Self {
        self.build_fn = Some(Box::new(build_fn));
        self
    }

    /// Called every execute, in compiled order.
    pub fn on_execute(
        &mut self,
        execute_fn: impl FnMut(&mut Device, CommandListHandle) + 'static,
    ) -> &mut Self {
        self.execute_fn = Some(Box::new(execute_fn));
        self
    }
}

#[derive(Default)]
pub struct RenderGraph {
    passes: Vec<RenderGraphPass>,
    order: Vec<usize>,
    compiled: bool,
    // Last-known logical state of every texture the graph has touched.
    states: HashMap<TextureHandle, TextureState>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pass, replacing any existing pass with the same name. Any
    /// previous compilation is invalidated.
    pub fn add_graphics_pass(&mut self, name: &str) -> &mut RenderGraphPass {
        self.compiled = false;
        if let Some(index) = self.passes.iter().position(|pass| pass.name == name) {
            self.passes[index] = RenderGraphPass::new(name.to_owned());
            &mut self.passes[index]
        } else {
            self.passes.push(RenderGraphPass::new(name.to_owned()));
            let index = self.passes.len() - 1;
            &mut self.passes[index]
        }
    }

    /// Orders the passes and invokes every build callback exactly once with
    /// the given target dimensions. Fails if the read/write declarations
    /// form a cycle.
    pub fn compile(&mut self, width: u32, height: u32) -> Result<()> {
        let graph = build_dependency_graph(&self.passes);
        let order = graph.topological_sort().map_err(|cyclic| {
            let names = cyclic
                .iter()
                .map(|&index| self.passes[index].name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            eyre!("Render graph has a dependency cycle involving: {names}")
        })?;

        for &index in &order {
            if let Some(build_fn) = &mut self.passes[index].build_fn {
                build_fn(width, height);
            }
        }

        self.order = order;
        self.compiled = true;
        Ok(())
    }

    /// Replays every pass in compiled order against the command list,
    /// issuing the texture-state transitions implied by each pass's
    /// declarations before its execute callback runs.
    pub fn execute(&mut self, device: &mut Device, command_list: CommandListHandle) -> Result<()> {
        if !self.compiled {
            return Err(eyre!("Render graph must be compiled before execution"));
        }

        for position in 0..self.order.len() {
            let pass_index = self.order[position];

            let transitions =
                planned_transitions(&self.passes[pass_index], &mut self.states);
            for (texture, old, new) in transitions {
                device.transition_texture(command_list, texture, old, new);
            }

            if let Some(execute_fn) = &mut self.passes[pass_index].execute_fn {
                execute_fn(device, command_list);
            }
        }

        Ok(())
    }

    /// Pass names in compiled execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&index| self.passes[index].name.as_str())
            .collect()
    }
}

/// Readers run after every writer of what they read; multiple writers of one
/// texture keep their insertion order.
fn build_dependency_graph(passes: &[RenderGraphPass]) -> DependencyGraph {
    let mut writers: HashMap<TextureHandle, Vec<usize>> = HashMap::new();
    for (index, pass) in passes.iter().enumerate() {
        for write in &pass.writes {
            writers.entry(*write).or_default().push(index);
        }
    }

    let mut graph = DependencyGraph::new(passes.len());
    for texture_writers in writers.values() {
        for pair in texture_writers.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
    }
    for (index, pass) in passes.iter().enumerate() {
        for read in &pass.reads {
            if let Some(texture_writers) = writers.get(read) {
                for &writer in texture_writers {
                    graph.add_edge(writer, index);
                }
            }
        }
    }

    graph
}

/// Transitions needed before a pass runs: reads become shader-readable,
/// writes become render targets. Textures already in the wanted state are
/// skipped; `states` is updated in place.
fn planned_transitions(
    pass: &RenderGraphPass,
    states: &mut HashMap<TextureHandle, TextureState>,
) -> Vec<(TextureHandle, TextureState, TextureState)> {
    let mut transitions = Vec::new();
    let reads = pass.reads.iter().map(|&t| (t, TextureState::ShaderRead));
    let writes = pass.writes.iter().map(|&t| (t, TextureState::RenderTarget));

    for (texture, wanted) in reads.chain(writes) {
        let current = states.entry(texture).or_default();
        if *current != wanted {
            transitions.push((texture, *current, wanted));
            *current = wanted;
        }
    }

    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{DeviceHandle, Handle, Slot};

    fn texture(index: u32) -> TextureHandle {
        Handle::new(
            DeviceHandle {
                slot: Slot {
                    index: 0,
                    generation: 0,
                },
            },
            Slot {
                index,
                generation: 0,
            },
        )
    }

    #[test]
    fn writer_is_ordered_before_reader() {
        let t1 = texture(1);
        let t2 = texture(2);

        let mut graph = RenderGraph::new();
        graph.add_graphics_pass("p1").write(t1);
        graph.add_graphics_pass("p2").read(t1).write(t2);

        graph.compile(640, 480).unwrap();
        assert_eq!(graph.execution_order(), vec!["p1", "p2"]);
    }

    #[test]
    fn declaration_order_does_not_matter() {
        let t1 = texture(1);
        let t2 = texture(2);

        // The reader is added first; the writer of t1 must still run first.
        let mut graph = RenderGraph::new();
        graph.add_graphics_pass("p1").read(t1).write(t2);
        graph.add_graphics_pass("p2").write(t1);

        graph.compile(640, 480).unwrap();
        assert_eq!(graph.execution_order(), vec!["p2", "p1"]);
    }

    #[test]
    fn cycle_fails_deterministically() {
        let t1 = texture(1);
        let t2 = texture(2);

        let mut graph = RenderGraph::new();
        graph.add_graphics_pass("a").read(t2).write(t1);
        graph.add_graphics_pass("b").read(t1).write(t2);

        let first = graph.compile(640, 480).unwrap_err().to_string();
        let second = graph.compile(640, 480).unwrap_err().to_string();
        assert_eq!(first, second);
        assert!(first.contains("cycle"));
    }

    #[test]
    fn build_callbacks_receive_dimensions_once_per_compile() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let calls = Rc::new(RefCell::new(Vec::new()));
        let recorded = calls.clone();

        let mut graph = RenderGraph::new();
        graph
            .add_graphics_pass("p")
            .on_build(move |width, height| {
                recorded.borrow_mut().push((width, height));
            });

        graph.compile(800, 600).unwrap();
        assert_eq!(calls.borrow().as_slice(), &[(800, 600)]);

        graph.compile(1024, 768).unwrap();
        assert_eq!(calls.borrow().as_slice(), &[(800, 600), (1024, 768)]);
    }

    #[test]
    fn readding_a_pass_replaces_it() {
        let t1 = texture(1);
        let mut graph = RenderGraph::new();
        graph.add_graphics_pass("p").write(t1);
        graph.add_graphics_pass("p").read(t1);

        graph.compile(1, 1).unwrap();
        assert_eq!(graph.execution_order(), vec!["p"]);
    }

    #[test]
    fn transitions_follow_declared_accesses() {
        let t1 = texture(1);
        let t2 = texture(2);
        let mut states = HashMap::new();

        let mut writer = RenderGraphPass::new("w".into());
        writer.write(t1);
        let planned = planned_transitions(&writer, &mut states);
        assert_eq!(
            planned,
            vec![(t1, TextureState::Undefined, TextureState::RenderTarget)]
        );

        let mut reader = RenderGraphPass::new("r".into());
        reader.read(t1).write(t2);
        let planned = planned_transitions(&reader, &mut states);
        assert_eq!(
            planned,
            vec![
                (t1, TextureState::RenderTarget, TextureState::ShaderRead),
                (t2, TextureState::Undefined, TextureState::RenderTarget),
            ]
        );

        // Already in the wanted state: nothing to do.
        let mut again = RenderGraphPass::new("r2".into());
        again.read(t1);
        assert!(planned_transitions(&again, &mut states).is_empty());
    }
}
