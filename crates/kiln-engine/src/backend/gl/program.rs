use anyhow::{Context, Result, bail};
use glow::HasContext;

use crate::backend::pipeline::{Blend, PipelineKey, PipelineTable, Sampling, Topology};

const COMMON_VERT: &str = include_str!("shaders/common.vert");
const PLAIN_FRAG: &str = include_str!("shaders/plain.frag");
const TEX2D_FRAG: &str = include_str!("shaders/tex2d.frag");
const ARRAY_FRAG: &str = include_str!("shaders/array.frag");

const VERSION: &str = "#version 330 core\n";

const TRANSFORM_BLOCK: &str = "Transform";
/// Uniform buffer binding point of the transform block.
pub(super) const TRANSFORM_BINDING: u32 = 0;

/// A linked program and the GL state that goes with a pipeline key.
#[derive(Clone)]
pub(super) struct GlPipeline {
    pub(super) program: glow::Program,
    pub(super) mode: u32,
    pub(super) blend: Blend,
}

/// Programs for every sampling and premultiplication variant.
pub(super) struct Programs {
    programs: Vec<glow::Program>,
    table: PipelineTable<GlPipeline>,
}

impl Programs {
    pub(super) fn new(gl: &glow::Context) -> Result<Self> {
        // plain, tex2d, tex2d premul, array, array premul
        let variants = [
            (PLAIN_FRAG, false),
            (TEX2D_FRAG, false),
            (TEX2D_FRAG, true),
            (ARRAY_FRAG, false),
            (ARRAY_FRAG, true),
        ];
        let mut programs = Vec::with_capacity(variants.len());
        for (frag, premul) in variants {
            match unsafe { link(gl, frag, premul) } {
                Ok(program) => programs.push(program),
                Err(err) => {
                    for p in programs {
                        unsafe { gl.delete_program(p) };
                    }
                    return Err(err);
                }
            }
        }

        let table = PipelineTable::build(|key| {
            let program = programs[variant_index(key)];
            unsafe {
                gl.use_program(Some(program));
                if let Some(loc) = gl.get_uniform_location(program, "u_texture") {
                    gl.uniform_1_i32(Some(&loc), 0);
                }
                if let Some(block) = gl.get_uniform_block_index(program, TRANSFORM_BLOCK) {
                    gl.uniform_block_binding(program, block, TRANSFORM_BINDING);
                }
            }
            Ok(GlPipeline {
                program,
                mode: match key.topology {
                    Topology::Triangles => glow::TRIANGLES,
                    Topology::Lines => glow::LINES,
                },
                blend: key.blend,
            })
        })?;
        unsafe { gl.use_program(None) };

        log::debug!(
            "linked {} GL programs for {} pipelines",
            programs.len(),
            table.len()
        );
        Ok(Self { programs, table })
    }

    pub(super) fn get(&self, key: PipelineKey) -> &GlPipeline {
        self.table.get(key)
    }

    pub(super) fn destroy(&mut self, gl: &glow::Context) {
        for p in self.programs.drain(..) {
            unsafe { gl.delete_program(p) };
        }
    }
}

fn variant_index(key: PipelineKey) -> usize {
    let premul = key.blend == Blend::Premultiplied;
    match key.sampling {
        Sampling::None => 0,
        Sampling::D2 => 1 + premul as usize,
        Sampling::Array => 3 + premul as usize,
    }
}

unsafe fn compile(gl: &glow::Context, kind: u32, source: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = gl
            .create_shader(kind)
            .map_err(anyhow::Error::msg)
            .context("failed to create shader")?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            bail!("shader compilation failed: {log}");
        }
        Ok(shader)
    }
}

unsafe fn link(gl: &glow::Context, frag: &str, premul: bool) -> Result<glow::Program> {
    let defines = if premul { "#define PREMUL\n" } else { "" };
    let vs_src = format!("{VERSION}{COMMON_VERT}");
    let fs_src = format!("{VERSION}{defines}{frag}");

    unsafe {
        let vs = compile(gl, glow::VERTEX_SHADER, &vs_src)?;
        let fs = match compile(gl, glow::FRAGMENT_SHADER, &fs_src) {
            Ok(fs) => fs,
            Err(err) => {
                gl.delete_shader(vs);
                return Err(err);
            }
        };
        let program = gl
            .create_program()
            .map_err(anyhow::Error::msg)
            .context("failed to create program")?;
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            bail!("program link failed: {log}");
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premultiplied_keys_use_premul_variants() {
        for key in PipelineKey::all() {
            let idx = variant_index(key);
            let premul = key.blend == Blend::Premultiplied;
            match key.sampling {
                Sampling::None => assert_eq!(idx, 0),
                Sampling::D2 => assert_eq!(idx, if premul { 2 } else { 1 }),
                Sampling::Array => assert_eq!(idx, if premul { 4 } else { 3 }),
            }
        }
    }

    #[test]
    fn shader_sources_share_attribute_names() {
        for frag in [PLAIN_FRAG, TEX2D_FRAG, ARRAY_FRAG] {
            assert!(frag.contains("in vec4 v_color"));
        }
        assert!(COMMON_VERT.contains("out vec4 v_color"));
        assert!(COMMON_VERT.contains(&format!("uniform {TRANSFORM_BLOCK}")));
    }
}
