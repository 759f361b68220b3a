//! GPU objects and the per-frame update of the viewer.

use std::sync::Arc;

use anyhow::Result;
use glam::Vec3;
use orbit_core::EngineConfig;
use orbit_platform::{InputState, Window};
use orbit_renderer::{
    FrameLimits, FrameResources, GlobalUbo, ObjectDataStrategy, PointLightSystem, Renderer,
    ShaderPaths, ShadowMap, ShadowRenderSystem, SimpleRenderSystem, VulkanBackend,
};
use orbit_resources::{Mesh, Texture};
use orbit_rhi::device::Device;
use orbit_rhi::instance::Instance;
use orbit_rhi::physical_device::select_physical_device;
use orbit_scene::{Camera, DirectionalLight, KeyboardController, Transform, World};
use tracing::{error, info};

use crate::scene::{CameraDesc, SceneDescription, scene_bounds};

/// Everything that lives as long as the window.
///
/// Fields drop in declaration order: scene meshes and pipelines before the
/// buffers they read, the swap chain and surface before the device, and the
/// instance last.
pub struct Engine {
    world: World<Mesh>,
    viewer: Transform,
    camera: Camera,
    lens: CameraDesc,
    controller: KeyboardController,
    sun: DirectionalLight,
    bounds: (Vec3, f32),

    simple_system: SimpleRenderSystem,
    shadow_system: ShadowRenderSystem,
    point_light_system: PointLightSystem,
    frame_resources: FrameResources,
    shadow_map: ShadowMap,
    _texture: Texture,
    renderer: Renderer<VulkanBackend>,
    device: Arc<Device>,
    _instance: Instance,
}

impl Engine {
    /// Brings up Vulkan for `window` and loads the configured scene.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object, asset or shader cannot be
    /// created.
    pub fn new(window: &Window, config: &EngineConfig) -> Result<Self> {
        let extensions = window.required_extensions()?;
        let instance = Instance::new(&config.window.title, &extensions, config.renderer.validation)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let backend = VulkanBackend::new(
            Arc::clone(&device),
            surface,
            window.extent(),
            config.renderer.acquire_timeout_ns(),
            config.renderer.clear_color,
        )?;
        let renderer = Renderer::new(backend, window.extent());

        let assets = &config.assets;
        let scene = SceneDescription::from_assets(assets)?;
        let world = scene.build_world(&device, assets)?;
        let texture = match &scene.texture {
            Some(path) => Texture::from_file(Arc::clone(&device), assets.resolve(path))?,
            None => Texture::white(Arc::clone(&device))?,
        };

        let shadow_map = ShadowMap::new(Arc::clone(&device), config.renderer.shadow_map_size)?;
        let limits = FrameLimits {
            max_objects: u32::try_from(config.renderer.max_objects)?,
            max_lights: u32::try_from(config.renderer.max_lights)?,
        };
        let frame_resources = FrameResources::new(
            Arc::clone(&device),
            limits,
            texture.descriptor_info(),
            shadow_map.descriptor_info(),
        )?;
        let set_layouts = frame_resources.set_layouts();

        let strategy = ObjectDataStrategy::for_object_count(
            world.drawable_count(),
            config.renderer.object_strategy_threshold,
        );
        info!(
            "{} drawable objects, per-object data via {:?}",
            world.drawable_count(),
            strategy
        );

        let simple_system = SimpleRenderSystem::new(
            Arc::clone(&device),
            renderer.swap_chain_render_pass(),
            &set_layouts,
            strategy,
            &ShaderPaths::new(
                assets.shader(&strategy.vertex_shader("simple")),
                assets.shader("simple.frag"),
            ),
        )?;
        let shadow_system = ShadowRenderSystem::new(
            Arc::clone(&device),
            shadow_map.render_pass(),
            &set_layouts,
            strategy,
            &ShaderPaths::new(
                assets.shader(&strategy.vertex_shader("shadow")),
                assets.shader("shadow.frag"),
            ),
        )?;
        let point_light_system = PointLightSystem::new(
            Arc::clone(&device),
            renderer.swap_chain_render_pass(),
            set_layouts[0],
            &ShaderPaths::new(
                assets.shader("point_light.vert"),
                assets.shader("point_light.frag"),
            ),
            scene.light_orbit_speed,
            config.renderer.max_lights,
        )?;

        let mut viewer = Transform::new().with_translation(scene.camera.position);
        viewer.set_euler(scene.camera.rotation);
        let controller =
            KeyboardController::new(config.controller.move_speed, config.controller.look_speed);
        let bounds = scene_bounds(&world);

        Ok(Self {
            world,
            viewer,
            camera: Camera::new(),
            lens: scene.camera.clone(),
            controller,
            sun: scene.sun.light(),
            bounds,
            simple_system,
            shadow_system,
            point_light_system,
            frame_resources,
            shadow_map,
            _texture: texture,
            renderer,
            device,
            _instance: instance,
        })
    }

    /// Records the new window size; the swap chain follows on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    /// Moves the viewer and renders one frame.
    ///
    /// A frame the swap chain could not provide an image for is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error on any Vulkan failure; the caller should exit.
    pub fn draw_frame(&mut self, input: &InputState, frame_time: f32) -> Result<()> {
        self.controller
            .move_in_plane_xz(input, frame_time, &mut self.viewer);
        self.camera
            .set_view_quat(self.viewer.translation, self.viewer.rotation);

        let Some(command_buffer) = self.renderer.begin_frame()? else {
            return Ok(());
        };
        // After begin_frame, which may have rebuilt the swap chain.
        self.camera.set_perspective_projection(
            self.lens.fov_y.to_radians(),
            self.renderer.aspect_ratio(),
            self.lens.near,
            self.lens.far,
        );
        let frame_index = self.renderer.frame_index();

        let (center, radius) = self.bounds;
        self.shadow_map.update_light(&self.sun, center, radius);
        let mut ubo = GlobalUbo::new(&self.camera, &self.sun, self.shadow_map.light_view_projection());
        let lights = self
            .point_light_system
            .update(frame_time, &mut self.world, &mut ubo);
        self.frame_resources.write_global(frame_index, &ubo)?;
        self.frame_resources.write_lights(frame_index, &lights)?;
        self.simple_system
            .upload_objects(&mut self.frame_resources, frame_index, &self.world)?;

        let frame = self
            .frame_resources
            .frame_info(frame_index, frame_time, command_buffer, &self.camera);

        self.renderer
            .begin_render_pass(command_buffer, &self.shadow_map.target());
        self.shadow_system.render_game_objects(&frame, &self.world);
        self.renderer.end_render_pass(command_buffer);

        self.renderer.begin_swap_chain_render_pass(command_buffer);
        self.simple_system.render_game_objects(&frame, &self.world);
        self.point_light_system.render(&frame, &self.world);
        self.renderer.end_swap_chain_render_pass(command_buffer);

        self.renderer.end_frame()?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle: {:?}", e);
        }
    }
}
