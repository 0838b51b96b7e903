//! Pipeline variants and the per-draw selection rule.

use anyhow::Result;

use crate::command::{BlendMode, PrimType, RenderState, TextureDimension};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    Lines,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Sampling {
    None,
    D2,
    Array,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Blend {
    None,
    /// `src * a + dst * (1 - a)`
    Straight,
    /// `src + dst * (1 - a)`
    Premultiplied,
}

/// Index into the pipeline table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub topology: Topology,
    pub sampling: Sampling,
    pub blend: Blend,
}

const TOPOLOGIES: [Topology; 2] = [Topology::Triangles, Topology::Lines];
const SAMPLINGS: [Sampling; 3] = [Sampling::None, Sampling::D2, Sampling::Array];
const BLENDS: [Blend; 3] = [Blend::None, Blend::Straight, Blend::Premultiplied];

impl PipelineKey {
    pub const COUNT: usize = TOPOLOGIES.len() * SAMPLINGS.len() * BLENDS.len();

    pub fn index(self) -> usize {
        let t = self.topology as usize;
        let s = self.sampling as usize;
        let b = self.blend as usize;
        (t * SAMPLINGS.len() + s) * BLENDS.len() + b
    }

    /// Every key, in index order.
    pub fn all() -> impl Iterator<Item = PipelineKey> {
        TOPOLOGIES.into_iter().flat_map(|topology| {
            SAMPLINGS.into_iter().flat_map(move |sampling| {
                BLENDS.into_iter().map(move |blend| PipelineKey {
                    topology,
                    sampling,
                    blend,
                })
            })
        })
    }
}

/// What the backend found in the slot a draw refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoundTexture {
    /// The slot holds the variant the draw asked for.
    pub has_variant: bool,
    pub premultiplied: bool,
}

/// Picks the pipeline for a draw.
///
/// `bound` is `None` when the draw has no texture. A draw whose slot lacks the
/// requested variant falls back to the untextured pipeline.
pub fn select(prim: PrimType, state: &RenderState, bound: Option<BoundTexture>) -> PipelineKey {
    let topology = match prim {
        PrimType::Quads => Topology::Triangles,
        PrimType::Lines => Topology::Lines,
    };

    let texture = match (state.texture, bound) {
        (Some(_), Some(b)) if b.has_variant => Some(b),
        (Some(id), _) => {
            log::warn!("texture {} has no {:?} variant; drawing untextured", id.0, state.dimension);
            None
        }
        (None, _) => None,
    };

    let sampling = match (texture, state.dimension) {
        (None, _) => Sampling::None,
        (Some(_), TextureDimension::D2) => Sampling::D2,
        (Some(_), TextureDimension::Array) => Sampling::Array,
    };

    let blend = match state.blend {
        BlendMode::None => Blend::None,
        BlendMode::Alpha if texture.is_some_and(|t| t.premultiplied) => Blend::Premultiplied,
        BlendMode::Alpha => Blend::Straight,
    };

    PipelineKey {
        topology,
        sampling,
        blend,
    }
}

/// One pipeline object per [`PipelineKey`], built once.
pub struct PipelineTable<T> {
    entries: Vec<T>,
}

impl<T> PipelineTable<T> {
    pub fn build(mut create: impl FnMut(PipelineKey) -> Result<T>) -> Result<Self> {
        let entries = PipelineKey::all().map(&mut create).collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn get(&self, key: PipelineKey) -> &T {
        &self.entries[key.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
