//! Reloadable shader handles for the rendering layer.
//!
//! A [`Shader`] moves through `Unloaded → Loading → Ready | Failed`.
//! Asynchronous loads stay in `Loading` until [`Shader::poll`] observes the
//! finished compile and swaps the new result in as one `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use shade_common::{CompileOptions, ShaderType};
use shade_compiler::{CompiledShader, InputElement};

use crate::manager::ShaderManager;
use crate::task::CompileTask;
use crate::watcher::modified_time;

/// Load state of a [`Shader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderState {
    /// Nothing requested yet.
    Unloaded,
    /// A compile is in progress.
    Loading,
    /// The last compile succeeded.
    Ready,
    /// The last compile failed.
    Failed,
}

/// Pipeline slot a shader binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Vertex stage.
    Vertex,
    /// Tessellation control.
    Hull,
    /// Tessellation evaluation.
    Domain,
    /// Geometry stage.
    Geometry,
    /// Pixel stage.
    Pixel,
    /// Compute dispatch.
    Compute,
    /// Amplification (task) stage.
    Amplification,
    /// Mesh stage.
    Mesh,
    /// Any ray tracing library stage.
    RayTracing,
}

impl From<ShaderType> for PipelineStage {
    fn from(ty: ShaderType) -> Self {
        match ty {
            ShaderType::Vertex => PipelineStage::Vertex,
            ShaderType::Hull => PipelineStage::Hull,
            ShaderType::Domain => PipelineStage::Domain,
            ShaderType::Geometry => PipelineStage::Geometry,
            ShaderType::Pixel => PipelineStage::Pixel,
            ShaderType::Compute => PipelineStage::Compute,
            ShaderType::Amplification => PipelineStage::Amplification,
            ShaderType::Mesh => PipelineStage::Mesh,
            ShaderType::RayGeneration | ShaderType::Miss | ShaderType::ClosestHit | ShaderType::AnyHit => {
                PipelineStage::RayTracing
            }
        }
    }
}

/// Receives compiled shaders, e.g. a graphics device context.
pub trait BindTarget {
    /// Makes `shader` current for `stage`.
    fn bind_shader(&mut self, stage: PipelineStage, shader: &CompiledShader);

    /// Clears `stage`.
    fn unbind_shader(&mut self, stage: PipelineStage);
}

#[derive(Debug)]
enum Source {
    File(PathBuf),
    Inline { text: String, name: String },
}

/// A compiled shader plus the request that produced it.
#[derive(Debug)]
pub struct Shader {
    manager: ShaderManager,
    source: Source,
    entry_point: String,
    shader_type: ShaderType,
    options: CompileOptions,
    compiled: Option<Arc<CompiledShader>>,
    pending: Option<CompileTask>,
    state: ShaderState,
    last_modified: Option<SystemTime>,
}

impl Shader {
    pub(crate) fn from_file(
        manager: ShaderManager,
        path: PathBuf,
        entry_point: String,
        shader_type: ShaderType,
        options: CompileOptions,
    ) -> Self {
        Self::with_source(manager, Source::File(path), entry_point, shader_type, options)
    }

    pub(crate) fn from_source(
        manager: ShaderManager,
        text: String,
        name: String,
        entry_point: String,
        shader_type: ShaderType,
        options: CompileOptions,
    ) -> Self {
        Self::with_source(manager, Source::Inline { text, name }, entry_point, shader_type, options)
    }

    fn with_source(
        manager: ShaderManager,
        source: Source,
        entry_point: String,
        shader_type: ShaderType,
        options: CompileOptions,
    ) -> Self {
        Self {
            manager,
            source,
            entry_point,
            shader_type,
            options,
            compiled: None,
            pending: None,
            state: ShaderState::Unloaded,
            last_modified: None,
        }
    }

    /// Compiles on the calling thread. Returns `true` on success.
    ///
    /// Any pending asynchronous load is abandoned.
    pub fn load(&mut self) -> bool {
        self.begin_load();
        let result = match &self.source {
            Source::File(path) => {
                self.manager
                    .compile_shader_from_file(path, &self.entry_point, self.shader_type, &self.options)
            }
            Source::Inline { text, name } => {
                self.manager
                    .compile_shader(text, &self.entry_point, self.shader_type, &self.options, name)
            }
        };
        self.finish(result);
        self.state == ShaderState::Ready
    }

    /// Schedules a compile. The shader stays `Loading` until a later
    /// [`Shader::poll`] sees it finish.
    pub fn load_async(&mut self) {
        self.begin_load();
        let task = match &self.source {
            Source::File(path) => self.manager.compile_shader_from_file_async(
                path.clone(),
                self.entry_point.clone(),
                self.shader_type,
                self.options.clone(),
            ),
            Source::Inline { text, name } => self.manager.compile_shader_async(
                text.clone(),
                self.entry_point.clone(),
                self.shader_type,
                self.options.clone(),
                name.clone(),
            ),
        };
        self.pending = Some(task);
    }

    fn begin_load(&mut self) {
        self.pending = None;
        self.state = ShaderState::Loading;
        if let Source::File(path) = &self.source {
            self.last_modified = modified_time(path);
        }
    }

    fn finish(&mut self, result: Arc<CompiledShader>) {
        self.state = if result.success {
            ShaderState::Ready
        } else {
            log::warn!("shader {} failed to load:\n{}", self.name(), result.error_text());
            ShaderState::Failed
        };
        self.compiled = Some(result);
    }

    /// Completes a pending asynchronous load if it has finished.
    pub fn poll(&mut self) -> ShaderState {
        if let Some(result) = self.pending.as_mut().and_then(CompileTask::poll) {
            self.pending = None;
            self.finish(result);
        }
        self.state
    }

    /// Blocks until a pending asynchronous load finishes.
    pub fn wait(&mut self) -> ShaderState {
        if let Some(task) = self.pending.take() {
            self.finish(task.wait());
        }
        self.state
    }

    /// Reloads a file-backed shader whose file is strictly newer than the
    /// last observed time. Only `Ready` and `Failed` shaders reload.
    ///
    /// The new time is recorded whether or not the reload compiles, so a
    /// broken file is not retried until it changes again.
    pub fn check_for_reload(&mut self) -> bool {
        if !matches!(self.state, ShaderState::Ready | ShaderState::Failed) {
            return false;
        }
        let Source::File(path) = &self.source else {
            return false;
        };
        let Some(current) = modified_time(path) else {
            return false;
        };
        if self.last_modified.is_some_and(|last| current <= last) {
            return false;
        }
        log::info!("reloading {}", path.display());
        self.load();
        self.last_modified = Some(current);
        true
    }

    /// Current state.
    pub fn state(&self) -> ShaderState {
        self.state
    }

    /// `true` when a successful compile is available.
    pub fn is_ready(&self) -> bool {
        self.state == ShaderState::Ready
    }

    /// The latest compile result, successful or not.
    pub fn compiled(&self) -> Option<Arc<CompiledShader>> {
        self.compiled.clone()
    }

    /// Stage this shader was compiled for.
    pub fn shader_type(&self) -> ShaderType {
        self.shader_type
    }

    /// Slot this shader binds to.
    pub fn pipeline_stage(&self) -> PipelineStage {
        self.shader_type.into()
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Source file, `None` for in-memory shaders.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Inline { .. } => None,
        }
    }

    /// Path or label used in diagnostics.
    pub fn name(&self) -> String {
        match &self.source {
            Source::File(path) => path.display().to_string(),
            Source::Inline { name, .. } => name.clone(),
        }
    }

    /// Vertex input layout; empty until ready.
    pub fn input_layout(&self) -> &[InputElement] {
        self.ready().map(CompiledShader::input_layout).unwrap_or_default()
    }

    /// `true` if the compiled shader declares constant buffer `name`.
    pub fn has_constant_buffer(&self, name: &str) -> bool {
        self.ready().is_some_and(|c| c.has_constant_buffer(name))
    }

    /// `true` if the compiled shader declares texture `name`.
    pub fn has_texture(&self, name: &str) -> bool {
        self.ready().is_some_and(|c| c.has_texture(name))
    }

    /// `true` if the compiled shader declares sampler `name`.
    pub fn has_sampler(&self, name: &str) -> bool {
        self.ready().is_some_and(|c| c.has_sampler(name))
    }

    fn ready(&self) -> Option<&CompiledShader> {
        self.compiled.as_deref().filter(|c| c.success)
    }

    /// Binds to `target` if ready. While a reload is in flight the previous
    /// successful result stays bindable. Returns whether anything was bound.
    pub fn bind(&self, target: &mut dyn BindTarget) -> bool {
        match self.ready() {
            Some(compiled) if matches!(self.state, ShaderState::Ready | ShaderState::Loading) => {
                target.bind_shader(self.pipeline_stage(), compiled);
                true
            }
            _ => false,
        }
    }

    /// Clears this shader's stage on `target`.
    pub fn unbind(&self, target: &mut dyn BindTarget) {
        target.unbind_shader(self.pipeline_stage());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_config::ShaderManagerConfig;
    use std::fs;
    use std::time::Duration;

    const PS: &str = "Texture2D albedo : register(t0);\n\
        SamplerState linear_clamp : register(s0);\n\
        cbuffer Material : register(b0) { float4 tint; };\n\
        float4 main(float2 uv : TEXCOORD0) : SV_Target { return albedo.Sample(linear_clamp, uv) * tint; }";
    const VS: &str = "float4 main(float3 pos : POSITION, float2 uv : TEXCOORD0) : SV_Position { return float4(pos, 1); }";

    #[derive(Default)]
    struct Recorder {
        bound: Vec<(PipelineStage, usize)>,
        unbound: Vec<PipelineStage>,
    }

    impl BindTarget for Recorder {
        fn bind_shader(&mut self, stage: PipelineStage, shader: &CompiledShader) {
            self.bound.push((stage, shader.bytecode.len()));
        }

        fn unbind_shader(&mut self, stage: PipelineStage) {
            self.unbound.push(stage);
        }
    }

    fn manager(dir: &Path) -> ShaderManager {
        ShaderManager::new(ShaderManagerConfig {
            cache_directory: dir.join("cache"),
            compile_threads: 1,
            ..ShaderManagerConfig::default()
        })
        .unwrap()
    }

    fn set_time(path: &Path, secs: u64) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn stage_mapping_is_exhaustive() {
        assert_eq!(PipelineStage::from(ShaderType::Pixel), PipelineStage::Pixel);
        assert_eq!(PipelineStage::from(ShaderType::Miss), PipelineStage::RayTracing);
        assert_eq!(PipelineStage::from(ShaderType::Mesh), PipelineStage::Mesh);
    }

    #[test]
    fn sync_load_and_reflection() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut s = m.create_shader_from_source(PS, "material", "main", ShaderType::Pixel, CompileOptions::default());
        assert_eq!(s.state(), ShaderState::Unloaded);
        assert!(!s.has_texture("albedo"));
        assert!(s.load());
        assert!(s.is_ready());
        assert!(s.has_texture("albedo"));
        assert!(s.has_sampler("linear_clamp"));
        assert!(s.has_constant_buffer("Material"));
        assert!(!s.has_texture("normal"));
        assert_eq!(s.path(), None);
        assert_eq!(s.name(), "material");
    }

    #[test]
    fn vertex_input_layout() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut s = m.create_shader_from_source(VS, "mesh", "main", ShaderType::Vertex, CompileOptions::default());
        assert!(s.load());
        let layout = s.input_layout();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].semantic_name, "POSITION");
        assert_eq!(layout[1].semantic_name, "TEXCOORD");
        assert_eq!(layout[1].aligned_byte_offset, 12);
    }

    #[test]
    fn async_load_resolves_on_poll() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut s = m.create_shader_from_source(PS, "material", "main", ShaderType::Pixel, CompileOptions::default());
        s.load_async();
        assert_eq!(s.state(), ShaderState::Loading);
        m.shutdown();
        assert_eq!(s.poll(), ShaderState::Ready);
        assert!(s.compiled().unwrap().success);
    }

    #[test]
    fn failed_load_and_bind() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut target = Recorder::default();
        let mut bad = m.create_shader_from_source(PS, "material", "absent", ShaderType::Pixel, CompileOptions::default());
        assert!(!bad.load());
        assert_eq!(bad.state(), ShaderState::Failed);
        assert!(!bad.bind(&mut target));
        assert!(target.bound.is_empty());

        let mut good = m.create_shader_from_source(PS, "material", "main", ShaderType::Pixel, CompileOptions::default());
        good.load();
        assert!(good.bind(&mut target));
        good.unbind(&mut target);
        assert_eq!(target.bound.len(), 1);
        assert_eq!(target.bound[0].0, PipelineStage::Pixel);
        assert_eq!(target.unbound, vec![PipelineStage::Pixel]);
    }

    #[test]
    fn previous_result_binds_while_reloading() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut target = Recorder::default();
        let mut s = m.create_shader_from_source(PS, "material", "main", ShaderType::Pixel, CompileOptions::default());
        assert!(!s.bind(&mut target));
        s.load_async();
        assert!(!s.bind(&mut target));
        s.wait();

        s.load_async();
        assert_eq!(s.state(), ShaderState::Loading);
        assert!(s.bind(&mut target));
        assert!(s.has_texture("albedo"));
        s.wait();
        assert!(s.bind(&mut target));
        assert_eq!(target.bound.len(), 2);
    }

    #[test]
    fn reload_only_on_newer_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("material.ps.hlsl");
        fs::write(&path, PS).unwrap();
        set_time(&path, 1_000);
        let m = manager(dir.path());
        let mut s = m.create_shader(&path, "main", ShaderType::Pixel, CompileOptions::default());
        assert!(!s.check_for_reload());
        assert!(s.load());
        assert!(!s.check_for_reload());

        fs::write(&path, "float4 main( {").unwrap();
        set_time(&path, 2_000);
        assert!(s.check_for_reload());
        assert_eq!(s.state(), ShaderState::Failed);
        assert!(!s.check_for_reload());

        fs::write(&path, PS).unwrap();
        set_time(&path, 3_000);
        assert!(s.check_for_reload());
        assert!(s.is_ready());
    }
}
