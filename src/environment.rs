use crate::datatype::DataType;
use crate::function::Function;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Index of a frame in the [`Environment`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

const ROOT: FrameId = FrameId(0);

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

#[derive(Debug, Default)]
struct Frame {
    variables: HashMap<String, Binding>,
    functions: HashMap<(String, usize), Rc<Function>>,
    parent: Option<FrameId>,
    /// Set once a closure captures this frame or one of its descendants.
    /// Captured frames outlive their scope and are only reclaimed by
    /// [`Environment::collect_garbage`].
    captured: bool,
}

/// Raised by [`Environment::put_variable`] when the resolved binding is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmutableBinding(pub String);

/// Arena of scope frames. Frames refer to their parent by index, and closures
/// refer to their defining frame by index, so captured scopes form no `Rc`
/// cycles.
#[derive(Debug)]
pub struct Environment {
    frames: Vec<Option<Frame>>,
    free: Vec<usize>,
    types: HashMap<String, Rc<DataType>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let root = Frame {
            captured: true,
            ..Frame::default()
        };
        Self {
            frames: vec![Some(root)],
            free: Vec::new(),
            types: HashMap::new(),
        }
    }

    pub fn root(&self) -> FrameId {
        ROOT
    }

    fn frame(&self, id: FrameId) -> &Frame {
        match &self.frames[id.0] {
            Some(frame) => frame,
            None => unreachable!("frame {} used after release", id.0),
        }
    }

    fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        match &mut self.frames[id.0] {
            Some(frame) => frame,
            None => unreachable!("frame {} used after release", id.0),
        }
    }

    /// Walks from `id` to the root.
    fn chain(&self, id: FrameId) -> impl Iterator<Item = (FrameId, &Frame)> + '_ {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let current = next?;
            let frame = self.frame(current);
            next = frame.parent;
            Some((current, frame))
        })
    }

    pub fn child(&mut self, parent: FrameId) -> FrameId {
        let frame = Frame {
            parent: Some(parent),
            ..Frame::default()
        };
        match self.free.pop() {
            Some(slot) => {
                self.frames[slot] = Some(frame);
                FrameId(slot)
            }
            None => {
                self.frames.push(Some(frame));
                FrameId(self.frames.len() - 1)
            }
        }
    }

    pub fn get_variable(&self, id: FrameId, name: &str) -> Option<Value> {
        self.chain(id)
            .find_map(|(_, frame)| frame.variables.get(name))
            .map(|binding| binding.value.clone())
    }

    /// Assigns to the nearest existing binding of `name`, or creates one in
    /// `id` when no frame in the chain binds it.
    pub fn put_variable(&mut self, id: FrameId, name: &str, value: Value) -> Result<(), ImmutableBinding> {
        let owner = self
            .chain(id)
            .find(|(_, frame)| frame.variables.contains_key(name))
            .map(|(owner, _)| owner);

        match owner {
            Some(owner) => {
                let frame = self.frame_mut(owner);
                match frame.variables.get_mut(name) {
                    Some(binding) if !binding.mutable => Err(ImmutableBinding(name.to_string())),
                    Some(binding) => {
                        binding.value = value;
                        Ok(())
                    }
                    None => unreachable!("binding vanished during assignment"),
                }
            }
            None => {
                self.define(id, name, value, true);
                Ok(())
            }
        }
    }

    /// Binds `name` in `id` itself, shadowing any outer binding.
    pub fn define(&mut self, id: FrameId, name: &str, value: Value, mutable: bool) {
        self.frame_mut(id)
            .variables
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn get_function(&self, id: FrameId, name: &str, arity: usize) -> Option<Rc<Function>> {
        let key = (name.to_string(), arity);
        self.chain(id)
            .find_map(|(_, frame)| frame.functions.get(&key))
            .cloned()
    }

    /// Every arity under which `name` is reachable from `id`, nearest first.
    pub fn function_arities(&self, id: FrameId, name: &str) -> Vec<usize> {
        let mut arities = Vec::new();
        for (_, frame) in self.chain(id) {
            for (fn_name, arity) in frame.functions.keys() {
                if fn_name == name && !arities.contains(arity) {
                    arities.push(*arity);
                }
            }
        }
        arities
    }

    /// Same outward-search-then-bind-locally rule as [`put_variable`](Self::put_variable),
    /// keyed by `(name, arity)`.
    pub fn put_function(&mut self, id: FrameId, name: &str, function: Rc<Function>) {
        let key = (name.to_string(), function.arity());
        let owner = self
            .chain(id)
            .find(|(_, frame)| frame.functions.contains_key(&key))
            .map(|(owner, _)| owner)
            .unwrap_or(id);
        self.frame_mut(owner).functions.insert(key, function);
    }

    /// Marks `id` and its ancestors as retained by a closure.
    pub fn mark_captured(&mut self, id: FrameId) {
        let mut next = Some(id);
        while let Some(current) = next {
            let frame = self.frame_mut(current);
            if frame.captured {
                break;
            }
            frame.captured = true;
            next = frame.parent;
        }
    }

    /// Called when a scope exits. Frames no closure has captured are freed at
    /// once; captured ones wait for the next collection.
    pub fn release(&mut self, id: FrameId) {
        if id == ROOT || self.frame(id).captured {
            return;
        }
        self.frames[id.0] = None;
        self.free.push(id.0);
    }

    pub fn register_type(&mut self, data_type: DataType) -> Option<Rc<DataType>> {
        if self.types.contains_key(&data_type.name) {
            return None;
        }
        let data_type = Rc::new(data_type);
        self.types.insert(data_type.name.clone(), Rc::clone(&data_type));
        Some(data_type)
    }

    pub fn get_type(&self, name: &str) -> Option<Rc<DataType>> {
        self.types.get(name).cloned()
    }

    /// Variable bound in the root frame.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.get_variable(ROOT, name)
    }

    /// Function bound in the root frame under `(name, arity)`.
    pub fn global_function(&self, name: &str, arity: usize) -> Option<Rc<Function>> {
        self.get_function(ROOT, name, arity)
    }

    pub fn live_frames(&self) -> usize {
        self.frames.iter().filter(|frame| frame.is_some()).count()
    }

    /// Frees every frame that is not reachable from the root through
    /// bindings, closures, lists or data instances. Only sound while no
    /// scope other than the root is active. Returns the number of frames freed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut marked = HashSet::new();
        let mut seen_instances = HashSet::new();
        let mut pending = vec![ROOT];

        while let Some(id) = pending.pop() {
            if !marked.insert(id) {
                continue;
            }
            let frame = self.frame(id);
            if let Some(parent) = frame.parent {
                pending.push(parent);
            }
            for function in frame.functions.values() {
                pending.push(function.env);
            }
            let mut values: Vec<Value> = frame.variables.values().map(|b| b.value.clone()).collect();
            while let Some(value) = values.pop() {
                match value {
                    Value::Function(function) => pending.push(function.env),
                    Value::List(items) => values.extend(items.iter().cloned()),
                    Value::Data(instance) => {
                        // Field mutation can make instances cyclic
                        if seen_instances.insert(Rc::as_ptr(&instance)) {
                            values.extend(instance.borrow().values().cloned());
                        }
                    }
                    Value::Num(_) | Value::Bool(_) | Value::Char(_) | Value::Type(_) => {}
                }
            }
        }

        let mut freed = 0;
        for (slot, frame) in self.frames.iter_mut().enumerate() {
            if frame.is_some() && !marked.contains(&FrameId(slot)) {
                *frame = None;
                self.free.push(slot);
                freed += 1;
            }
        }
        if freed > 0 {
            tracing::debug!(freed, live = self.live_frames(), "reclaimed frames");
        }
        freed
    }
}
