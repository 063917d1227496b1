//! Transformation matrices and their lazy dependency graph.
//!
//! Three leaf matrices (projection, view, world) feed three composites.
//! Writing a slot walks the dependency table and marks every transitive
//! dependent stale; reading a stale slot recomputes it from its inputs.
//!
//! Composition uses column vectors: `view_projection = projection * view`,
//! so a composite applies its inputs right to left.
//!
//! # Invariants
//! - A composite is never marked fresh while any of its inputs changed after
//!   its last recomputation.
//! - Each composite is recomputed at most once per batch of leaf writes.

use glam::Mat4;

use crate::context::{ShaderUniform, UniformLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatrixType {
    Projection,
    View,
    World,
    ViewProjection,
    WorldView,
    WorldViewProjection,
}

impl MatrixType {
    pub const COUNT: usize = 6;

    pub const ALL: [MatrixType; Self::COUNT] = [
        MatrixType::Projection,
        MatrixType::View,
        MatrixType::World,
        MatrixType::ViewProjection,
        MatrixType::WorldView,
        MatrixType::WorldViewProjection,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Shader uniform this matrix is bound to.
    pub fn uniform(self) -> ShaderUniform {
        match self {
            MatrixType::Projection => ShaderUniform::ProjMatrix,
            MatrixType::View => ShaderUniform::ViewMatrix,
            MatrixType::World => ShaderUniform::WorldMatrix,
            MatrixType::ViewProjection => ShaderUniform::ViewProjMatrix,
            MatrixType::WorldView => ShaderUniform::WorldViewMatrix,
            MatrixType::WorldViewProjection => ShaderUniform::WorldViewProjMatrix,
        }
    }

    /// Slots directly invalidated when this one is written.
    ///
    /// `View -> World` is deliberate: a view change also marks the world
    /// slot stale, which in turn reaches `WorldView`.
    pub fn dependents(self) -> &'static [MatrixType] {
        match self {
            MatrixType::Projection => &[MatrixType::ViewProjection, MatrixType::WorldViewProjection],
            MatrixType::View => &[
                MatrixType::ViewProjection,
                MatrixType::World,
                MatrixType::WorldViewProjection,
            ],
            MatrixType::World => &[MatrixType::WorldView, MatrixType::WorldViewProjection],
            MatrixType::WorldView => &[MatrixType::WorldViewProjection],
            MatrixType::ViewProjection | MatrixType::WorldViewProjection => &[],
        }
    }

    /// Slots read when recomputing this one.
    pub fn inputs(self) -> &'static [MatrixType] {
        match self {
            MatrixType::Projection | MatrixType::View | MatrixType::World => &[],
            MatrixType::ViewProjection => &[MatrixType::View, MatrixType::Projection],
            MatrixType::WorldView => &[MatrixType::World, MatrixType::View],
            MatrixType::WorldViewProjection => &[MatrixType::WorldView, MatrixType::Projection],
        }
    }

    pub fn is_leaf(self) -> bool {
        self.inputs().is_empty()
    }
}

/// Cached value and bookkeeping for one matrix kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixSlot {
    pub value: Mat4,
    /// Pushed to the currently bound shader since the value last changed.
    pub sent: bool,
    /// Consistent with its inputs.
    pub updated: bool,
    /// Binding slot in the current shader, `None` if the shader lacks it.
    pub location: Option<UniformLocation>,
}

impl Default for MatrixSlot {
    fn default() -> Self {
        Self {
            value: Mat4::IDENTITY,
            sent: false,
            updated: true,
            location: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatrixSet {
    slots: [MatrixSlot; MatrixType::COUNT],
    recomputations: [u32; MatrixType::COUNT],
}

impl MatrixSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, ty: MatrixType) -> &MatrixSlot {
        &self.slots[ty.index()]
    }

    /// Number of times a composite was rebuilt from its inputs.
    pub fn recompute_count(&self, ty: MatrixType) -> u32 {
        self.recomputations[ty.index()]
    }

    pub fn set(&mut self, ty: MatrixType, value: Mat4) {
        let slot = &mut self.slots[ty.index()];
        slot.value = value;
        slot.updated = true;
        slot.sent = false;
        self.invalidate_dependents(ty);
    }

    /// Current value, recomputing it first if it is stale.
    pub fn get(&mut self, ty: MatrixType) -> Mat4 {
        self.resolve(ty);
        self.slots[ty.index()].value
    }

    fn invalidate_dependents(&mut self, ty: MatrixType) {
        for &dependent in ty.dependents() {
            let slot = &mut self.slots[dependent.index()];
            slot.updated = false;
            slot.sent = false;
            self.invalidate_dependents(dependent);
        }
    }

    fn resolve(&mut self, ty: MatrixType) {
        if self.slots[ty.index()].updated {
            return;
        }

        for &input in ty.inputs() {
            self.resolve(input);
        }

        let value = |s: &Self, t: MatrixType| s.slots[t.index()].value;
        let recomputed = match ty {
            MatrixType::Projection | MatrixType::View | MatrixType::World => None,
            MatrixType::ViewProjection => {
                Some(value(self, MatrixType::Projection) * value(self, MatrixType::View))
            }
            MatrixType::WorldView => {
                Some(value(self, MatrixType::View) * value(self, MatrixType::World))
            }
            MatrixType::WorldViewProjection => {
                Some(value(self, MatrixType::Projection) * value(self, MatrixType::WorldView))
            }
        };

        if let Some(matrix) = recomputed {
            self.slots[ty.index()].value = matrix;
            self.recomputations[ty.index()] += 1;
        }
        self.slots[ty.index()].updated = true;
    }

    /// Re-resolve every binding slot against a newly bound shader.
    ///
    /// All matrices become unsent: the new program holds none of them yet.
    pub fn rebind(&mut self, mut locate: impl FnMut(ShaderUniform) -> Option<UniformLocation>) {
        for ty in MatrixType::ALL {
            let slot = &mut self.slots[ty.index()];
            slot.location = locate(ty.uniform());
            slot.sent = false;
        }
    }

    /// Push every located, unsent matrix through `send`. Returns how many
    /// were sent.
    ///
    /// A slot already on the device is skipped even when other matrices are
    /// dirty. It becomes unsent again when its value or one of its inputs
    /// changes, or when [`MatrixSet::rebind`] moves to another shader, so a
    /// shader switch still re-sends every located matrix once.
    pub fn send_pending(&mut self, mut send: impl FnMut(UniformLocation, &Mat4)) -> usize {
        let mut sent = 0;
        for ty in MatrixType::ALL {
            let slot = self.slots[ty.index()];
            let Some(location) = slot.location else {
                continue;
            };
            if slot.sent {
                continue;
            }

            self.resolve(ty);
            let slot = &mut self.slots[ty.index()];
            send(location, &slot.value);
            slot.sent = true;
            sent += 1;
        }
        sent
    }
}
