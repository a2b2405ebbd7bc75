//! Content-addressed caches. Every cache key is a full value type with
//! structural `Eq`/`Hash` - list fields that have no semantically
//! meaningful order are sorted before hashing so two keys that describe the
//! same thing always compare equal.

use fxhash::FxHashMap;
use ordered_float::OrderedFloat;
use std::sync::Mutex;

use crate::access::SyncPointMask;
use crate::resources::Format;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AddressMode {
    Clamp,
    Mirror,
    Wrap,
    Border,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SamplerKey {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub min_lod: OrderedFloat<f32>,
    pub max_lod: OrderedFloat<f32>,
    pub max_anisotropy: OrderedFloat<f32>,
    pub border_color: [OrderedFloat<f32>; 4],
    pub compare: Option<CompareOp>,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DescriptorKind {
    Sampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DescriptorRange {
    pub register: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub visible_to: SyncPointMask,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DescriptorSetLayoutKey {
    pub ranges: Vec<DescriptorRange>,
}

impl DescriptorSetLayoutKey {
    pub fn canonical(mut ranges: Vec<DescriptorRange>) -> DescriptorSetLayoutKey {
        ranges.sort_by_key(|r| r.register);
        DescriptorSetLayoutKey { ranges }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PipelineResourcesKey {
    /// `(space, layout)` pairs, sorted by space.
    pub spaces: Vec<(u32, DescriptorSetLayoutKey)>,
}

impl PipelineResourcesKey {
    pub fn canonical(mut spaces: Vec<(u32, DescriptorSetLayoutKey)>) -> PipelineResourcesKey {
        spaces.sort_by_key(|(space, _)| *space);
        PipelineResourcesKey { spaces }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGen,
    ClosestHit,
    Miss,
    Intersection,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ShaderSetResourcesKey {
    /// `(shader_id, stage)` pairs, sorted, merged across stages that
    /// reference the same shader id.
    pub shaders: Vec<(u64, ShaderStage)>,
}

impl ShaderSetResourcesKey {
    pub fn merged(mut shaders: Vec<(u64, ShaderStage)>) -> ShaderSetResourcesKey {
        shaders.sort();
        shaders.dedup();
        ShaderSetResourcesKey { shaders }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct VertexInputBinding {
    pub location: u32,
    pub format: Format,
    pub offset: u32,
    pub buffer_slot: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GraphicsPipelineKey {
    pub resources: PipelineResourcesKey,
    pub vertex_inputs: Vec<VertexInputBinding>,
    pub render_target_formats: Vec<Format>,
    pub depth_stencil_format: Option<Format>,
    pub vertex_shader: u64,
    pub fragment_shader: Option<u64>,
    pub topology: PrimitiveTopology,
    /// Blend/raster/depth-stencil state packed as opaque bits - the exact
    /// layout is backend-defined, this crate only needs it to hash and
    /// compare.
    pub fixed_function_state: u64,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RayTracingPipelineKey {
    pub resources: PipelineResourcesKey,
    pub hit_groups: Vec<(u64, u64, Option<u64>)>,
    pub general_shaders: Vec<u64>,
    pub max_recursion_depth: u32,
    pub max_payload_size: u32,
    pub max_attribute_size: u32,
}

/// The permanent-lifetime content-addressed caches. No entry is ever
/// evicted - there is no reason to, at the scale this context operates at.
#[derive(Default)]
pub struct ContextCache {
    samplers: Mutex<FxHashMap<SamplerKey, u32>>,
    descriptor_set_layouts: Mutex<FxHashMap<DescriptorSetLayoutKey, u32>>,
    pipeline_resources: Mutex<FxHashMap<PipelineResourcesKey, u32>>,
    shader_set_resources: Mutex<FxHashMap<ShaderSetResourcesKey, u32>>,
    graphics_pipelines: Mutex<FxHashMap<GraphicsPipelineKey, u32>>,
    ray_tracing_pipelines: Mutex<FxHashMap<RayTracingPipelineKey, u32>>,
    next_handle: std::sync::atomic::AtomicU32,
}

impl ContextCache {
    pub fn new() -> ContextCache {
        ContextCache::default()
    }

    fn fresh_handle(&self) -> u32 {
        self.next_handle
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    pub fn sampler(&self, key: SamplerKey) -> u32 {
        let mut map = self.samplers.lock().unwrap();
        if let Some(&h) = map.get(&key) {
            return h;
        }
        let h = self.fresh_handle();
        map.insert(key, h);
        h
    }

    pub fn descriptor_set_layout(&self, key: DescriptorSetLayoutKey) -> u32 {
        let mut map = self.descriptor_set_layouts.lock().unwrap();
        if let Some(&h) = map.get(&key) {
            return h;
        }
        let h = self.fresh_handle();
        map.insert(key, h);
        h
    }

    pub fn pipeline_resources(&self, key: PipelineResourcesKey) -> u32 {
        let mut map = self.pipeline_resources.lock().unwrap();
        if let Some(&h) = map.get(&key) {
            return h;
        }
        let h = self.fresh_handle();
        map.insert(key, h);
        h
    }

    pub fn shader_set_resources(&self, key: ShaderSetResourcesKey) -> u32 {
        let mut map = self.shader_set_resources.lock().unwrap();
        if let Some(&h) = map.get(&key) {
            return h;
        }
        let h = self.fresh_handle();
        map.insert(key, h);
        h
    }

    pub fn graphics_pipeline(&self, key: GraphicsPipelineKey) -> u32 {
        let mut map = self.graphics_pipelines.lock().unwrap();
        if let Some(&h) = map.get(&key) {
            return h;
        }
        let h = self.fresh_handle();
        map.insert(key, h);
        h
    }

    pub fn ray_tracing_pipeline(&self, key: RayTracingPipelineKey) -> u32 {
        let mut map = self.ray_tracing_pipelines.lock().unwrap();
        if let Some(&h) = map.get(&key) {
            return h;
        }
        let h = self.fresh_handle();
        map.insert(key, h);
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler_key() -> SamplerKey {
        SamplerKey {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            min_lod: OrderedFloat(0.0),
            max_lod: OrderedFloat(12.0),
            max_anisotropy: OrderedFloat(1.0),
            border_color: [OrderedFloat(0.0); 4],
            compare: None,
        }
    }

    #[test]
    fn identical_keys_hit_the_cache() {
        let cache = ContextCache::new();
        let a = cache.sampler(sampler_key());
        let b = cache.sampler(sampler_key());
        assert_eq!(a, b);
    }

    #[test]
    fn descriptor_set_layout_key_is_order_independent() {
        let a = DescriptorSetLayoutKey::canonical(vec![
            DescriptorRange {
                register: 1,
                kind: DescriptorKind::SampledImage,
                count: 1,
                visible_to: SyncPointMask::PIXEL_SHADER,
            },
            DescriptorRange {
                register: 0,
                kind: DescriptorKind::UniformBuffer,
                count: 1,
                visible_to: SyncPointMask::VERTEX_SHADER,
            },
        ]);
        let b = DescriptorSetLayoutKey::canonical(vec![
            DescriptorRange {
                register: 0,
                kind: DescriptorKind::UniformBuffer,
                count: 1,
                visible_to: SyncPointMask::VERTEX_SHADER,
            },
            DescriptorRange {
                register: 1,
                kind: DescriptorKind::SampledImage,
                count: 1,
                visible_to: SyncPointMask::PIXEL_SHADER,
            },
        ]);
        assert_eq!(a, b);
    }
}
