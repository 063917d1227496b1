//! Fixed-function render states applied as one snapshot before every draw.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFunc {
    DestAlpha,
    DestColor,
    SrcAlpha,
    SrcColor,
    InvDestAlpha,
    InvDestColor,
    InvSrcAlpha,
    InvSrcColor,
    One,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceSide {
    Back,
    Front,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceFilling {
    Point,
    Line,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Always,
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StencilOperation {
    Decrement,
    DecrementToSaturation,
    Increment,
    IncrementToSaturation,
    Invert,
    Keep,
    Replace,
    Zero,
}

/// Toggleable pipeline capabilities, one flag each in [`RenderStates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RendererParameter {
    Blend,
    ColorWrite,
    DepthBuffer,
    DepthWrite,
    FaceCulling,
    ScissorTest,
    StencilTest,
}

impl RendererParameter {
    pub const COUNT: usize = 7;

    pub const ALL: [RendererParameter; Self::COUNT] = [
        RendererParameter::Blend,
        RendererParameter::ColorWrite,
        RendererParameter::DepthBuffer,
        RendererParameter::DepthWrite,
        RendererParameter::FaceCulling,
        RendererParameter::ScissorTest,
        RendererParameter::StencilTest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Complete fixed-function state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStates {
    pub src_blend: BlendFunc,
    pub dst_blend: BlendFunc,
    pub face_culling: FaceSide,
    pub face_filling: FaceFilling,
    pub depth_func: Comparison,
    pub stencil_compare: Comparison,
    pub stencil_fail: StencilOperation,
    pub stencil_pass: StencilOperation,
    pub stencil_zfail: StencilOperation,
    pub stencil_mask: u32,
    pub stencil_reference: u32,
    pub line_width: f32,
    pub point_size: f32,
    pub parameters: [bool; RendererParameter::COUNT],
}

impl RenderStates {
    pub fn is_enabled(&self, parameter: RendererParameter) -> bool {
        self.parameters[parameter.index()]
    }

    pub fn set_enabled(&mut self, parameter: RendererParameter, enable: bool) {
        self.parameters[parameter.index()] = enable;
    }
}

impl Default for RenderStates {
    fn default() -> Self {
        let mut parameters = [false; RendererParameter::COUNT];
        parameters[RendererParameter::ColorWrite.index()] = true;
        parameters[RendererParameter::DepthBuffer.index()] = true;
        parameters[RendererParameter::DepthWrite.index()] = true;
        parameters[RendererParameter::FaceCulling.index()] = true;

        Self {
            src_blend: BlendFunc::One,
            dst_blend: BlendFunc::Zero,
            face_culling: FaceSide::Back,
            face_filling: FaceFilling::Fill,
            depth_func: Comparison::Less,
            stencil_compare: Comparison::Always,
            stencil_fail: StencilOperation::Keep,
            stencil_pass: StencilOperation::Keep,
            stencil_zfail: StencilOperation::Keep,
            stencil_mask: 0xFFFF_FFFF,
            stencil_reference: 0,
            line_width: 1.0,
            point_size: 1.0,
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_indices_match_table_order() {
        for (i, parameter) in RendererParameter::ALL.iter().enumerate() {
            assert_eq!(parameter.index(), i);
        }
    }

    #[test]
    fn default_states_write_depth_and_color() {
        let states = RenderStates::default();
        assert!(states.is_enabled(RendererParameter::DepthWrite));
        assert!(states.is_enabled(RendererParameter::ColorWrite));
        assert!(!states.is_enabled(RendererParameter::Blend));
        assert!(!states.is_enabled(RendererParameter::ScissorTest));
    }

    #[test]
    fn toggling_one_parameter_leaves_others() {
        let mut states = RenderStates::default();
        states.set_enabled(RendererParameter::Blend, true);
        assert!(states.is_enabled(RendererParameter::Blend));
        assert!(!states.is_enabled(RendererParameter::StencilTest));
    }
}
