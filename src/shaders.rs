//! GLSL dialect handling: vertex-stage synthesis and program compilation.
//!
//! Callers supply only a fragment stage. The matching vertex stage is
//! synthesized from one of two fixed templates — GLSL ES 1.00 ("legacy")
//! or GLSL ES 3.00 ("modern") — depending on whether the fragment source's
//! first line declares `#version 300`. Both stages of one program always
//! use the same dialect.

use glow::HasContext;

use crate::error::Error;
use crate::types::CoordSpace;

/// The attribute name bound to location 0 in both templates.
pub(crate) const POSITION_ATTRIBUTE: &str = "a_position";

/// Internal uniform carrying the render target's vertical-flip flag.
pub(crate) const FLIP_UNIFORM: &str = "u_flip";

/// Internal uniform carrying the render target's size in pixels. Only
/// declared when a [`CoordSpace::Pixel`] varying was requested.
pub(crate) const RESOLUTION_UNIFORM: &str = "u_resolution";

/// Varying name bound to `[0, 1]²` coordinates when the caller requests no
/// pixel-coordinate varying of their own.
pub(crate) const DEFAULT_COORD_NAME: &str = "uv";

/// The two supported shading-language dialects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// GLSL ES 1.00: `attribute`/`varying`, `gl_FragColor`.
    Legacy,
    /// GLSL ES 3.00: `in`/`out`, user-declared fragment outputs.
    Modern,
}

/// Select the dialect by inspecting the fragment source's first line.
pub(crate) fn detect_dialect(fragment_src: &str) -> Dialect {
    let first_line = fragment_src.lines().next().unwrap_or("").trim();
    if first_line.starts_with("#version 300") {
        Dialect::Modern
    } else {
        Dialect::Legacy
    }
}

/// Synthesize the vertex stage for the given dialect and requested
/// pixel-coordinate varyings.
///
/// Each `(name, space)` pair becomes a `vec2` varying carrying either the
/// normalized `[0, 1]²` coordinate or the same coordinate scaled by
/// `u_resolution`. The clip-space Y is negated when `u_flip` is 1 so the
/// fragment coordinate system matches the target's orientation.
pub(crate) fn synthesize_vertex_source(dialect: Dialect, coords: &[(String, CoordSpace)]) -> String {
    let wants_resolution = coords.iter().any(|(_, space)| *space == CoordSpace::Pixel);

    let mut src = String::new();
    match dialect {
        Dialect::Modern => {
            src.push_str("#version 300 es\n");
            src.push_str(&format!("in vec2 {POSITION_ATTRIBUTE};\n"));
        }
        Dialect::Legacy => {
            src.push_str(&format!("attribute vec2 {POSITION_ATTRIBUTE};\n"));
        }
    }
    src.push_str(&format!("uniform float {FLIP_UNIFORM};\n"));
    if wants_resolution {
        src.push_str(&format!("uniform vec2 {RESOLUTION_UNIFORM};\n"));
    }

    let out_keyword = match dialect {
        Dialect::Modern => "out",
        Dialect::Legacy => "varying",
    };
    for (name, _) in coords {
        src.push_str(&format!("{out_keyword} vec2 {name};\n"));
    }

    src.push_str("void main() {\n");
    src.push_str(&format!(
        "    vec2 unit = {POSITION_ATTRIBUTE} * 0.5 + 0.5;\n"
    ));
    for (name, space) in coords {
        match space {
            CoordSpace::Unit => src.push_str(&format!("    {name} = unit;\n")),
            CoordSpace::Pixel => {
                src.push_str(&format!("    {name} = unit * {RESOLUTION_UNIFORM};\n"));
            }
        }
    }
    src.push_str(&format!(
        "    gl_Position = vec4({POSITION_ATTRIBUTE}.x, {POSITION_ATTRIBUTE}.y * (1.0 - 2.0 * {FLIP_UNIFORM}), 0.0, 1.0);\n"
    ));
    src.push_str("}\n");
    src
}

/// Compile a shader program from vertex and fragment source strings.
///
/// The position attribute is bound to location 0 before linking so the
/// shared quad VAO works with every program. The compiled shader objects
/// are detached and deleted after successful linking, so only the program
/// handle needs to be cleaned up by the caller.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns [`Error::ShaderCompilation`] carrying the device compiler's
/// diagnostic if shader compilation or program linking fails.
pub(crate) unsafe fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, Error> {
    let program = unsafe { gl.create_program() }.map_err(|e| Error::device("create program", e))?;

    let vs = unsafe { compile_shader(gl, glow::VERTEX_SHADER, vertex_src) }?;
    let fs = unsafe { compile_shader(gl, glow::FRAGMENT_SHADER, fragment_src) }?;

    unsafe {
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.bind_attrib_location(program, 0, POSITION_ATTRIBUTE);
        gl.link_program(program);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(Error::ShaderCompilation(format!("link error: {log}")));
        }

        // Shaders can be detached and deleted after successful linking.
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
    }

    Ok(program)
}

/// Compile a single shader stage (vertex or fragment) from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, Error> {
    unsafe {
        let shader = gl
            .create_shader(shader_type)
            .map_err(|e| Error::device("create shader", e))?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            let stage = if shader_type == glow::VERTEX_SHADER {
                "vertex"
            } else {
                "fragment"
            };
            return Err(Error::ShaderCompilation(format!("{stage} stage: {log}")));
        }

        Ok(shader)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn coords(pairs: &[(&str, CoordSpace)]) -> Vec<(String, CoordSpace)> {
        pairs
            .iter()
            .map(|(name, space)| ((*name).to_owned(), *space))
            .collect()
    }

    #[test]
    fn version_300_first_line_selects_modern() {
        assert_eq!(
            detect_dialect("#version 300 es\nvoid main() {}"),
            Dialect::Modern
        );
    }

    #[test]
    fn missing_version_line_selects_legacy() {
        assert_eq!(
            detect_dialect("precision highp float;\nvoid main() {}"),
            Dialect::Legacy
        );
        assert_eq!(detect_dialect(""), Dialect::Legacy);
    }

    #[test]
    fn version_line_only_counts_on_the_first_line() {
        assert_eq!(
            detect_dialect("// comment\n#version 300 es\nvoid main() {}"),
            Dialect::Legacy
        );
    }

    #[test]
    fn leading_whitespace_on_the_version_line_is_tolerated() {
        assert_eq!(
            detect_dialect("  #version 300 es\nvoid main() {}"),
            Dialect::Modern
        );
    }

    #[test]
    fn modern_template_uses_in_out() {
        let src = synthesize_vertex_source(Dialect::Modern, &coords(&[("uv", CoordSpace::Unit)]));
        assert!(src.starts_with("#version 300 es\n"));
        assert!(src.contains("in vec2 a_position;"));
        assert!(src.contains("out vec2 uv;"));
        assert!(src.contains("uv = unit;"));
    }

    #[test]
    fn legacy_template_uses_attribute_varying() {
        let src = synthesize_vertex_source(Dialect::Legacy, &coords(&[("uv", CoordSpace::Unit)]));
        assert!(!src.contains("#version"));
        assert!(src.contains("attribute vec2 a_position;"));
        assert!(src.contains("varying vec2 uv;"));
    }

    #[test]
    fn pixel_varying_declares_and_uses_resolution() {
        let src = synthesize_vertex_source(Dialect::Modern, &coords(&[("px", CoordSpace::Pixel)]));
        assert!(src.contains("uniform vec2 u_resolution;"));
        assert!(src.contains("px = unit * u_resolution;"));
    }

    #[test]
    fn unit_only_varyings_omit_resolution() {
        let src = synthesize_vertex_source(Dialect::Legacy, &coords(&[("uv", CoordSpace::Unit)]));
        assert!(!src.contains(RESOLUTION_UNIFORM));
    }

    #[test]
    fn mixed_varyings_emit_both_assignments() {
        let src = synthesize_vertex_source(
            Dialect::Modern,
            &coords(&[("uv", CoordSpace::Unit), ("px", CoordSpace::Pixel)]),
        );
        assert!(src.contains("uv = unit;"));
        assert!(src.contains("px = unit * u_resolution;"));
    }

    #[test]
    fn flip_flag_negates_clip_space_y() {
        let src = synthesize_vertex_source(Dialect::Legacy, &coords(&[("uv", CoordSpace::Unit)]));
        assert!(src.contains("uniform float u_flip;"));
        assert!(src.contains("a_position.y * (1.0 - 2.0 * u_flip)"));
    }
}
