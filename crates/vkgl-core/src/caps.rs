//! Backend capability table consulted at record time for every
//! conditionally supported operation.

/// Optional operations the active backend actually supports.
///
/// The engine never guesses: a recording call that needs a flag the backend
/// does not set is dropped and reported, never mistranslated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    pub multi_draw_indirect: bool,
    pub base_instance: bool,
    pub compute_shaders: bool,
    pub storage_image_atomics: bool,
    pub timer_queries: bool,
}

impl DeviceCaps {
    /// Everything on. Matches a GL 4.6-class or D3D11.1-class context.
    pub fn full() -> Self {
        Self {
            multi_draw_indirect: true,
            base_instance: true,
            compute_shaders: true,
            storage_image_atomics: true,
            timer_queries: true,
        }
    }

    /// GL3-class context: no compute, no indirect multi-draw, no base instance.
    pub fn gl3() -> Self {
        Self {
            multi_draw_indirect: false,
            base_instance: false,
            compute_shaders: false,
            storage_image_atomics: false,
            timer_queries: true,
        }
    }

    /// D3D11-class context: compute but no multi-draw-indirect.
    pub fn d3d11() -> Self {
        Self {
            multi_draw_indirect: false,
            base_instance: true,
            compute_shaders: true,
            storage_image_atomics: true,
            timer_queries: true,
        }
    }
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self::full()
    }
}
