//! Stage camera and pointer mapping.
//!
//! Normalized device coordinates follow the OpenGL convention: x right and y up in
//! [-1, 1], depth -1 at the near plane and 1 at the far plane.

use crate::config::SceneConfig;
use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

/// Size of the host window in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }
}

/// Canvas bounds in window pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl CanvasRect {
    /// Canvas covering the whole viewport
    pub fn full(viewport: Viewport) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: viewport.width,
            height: viewport.height,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// Pointer position inside the canvas mapped to NDC
pub fn pointer_to_ndc(client: Vec2, canvas: &CanvasRect) -> Vec2 {
    Vec2::new(
        ((client.x - canvas.left) / canvas.width.max(1.0)) * 2.0 - 1.0,
        -((client.y - canvas.top) / canvas.height.max(1.0)) * 2.0 + 1.0,
    )
}

/// Pointer position anywhere in the window mapped to [-1, 1] on each axis
pub fn window_to_normalized(client: Vec2, viewport: &Viewport) -> Vec2 {
    Vec2::new(
        (client.x / viewport.width) * 2.0 - 1.0,
        -(client.y / viewport.height) * 2.0 + 1.0,
    )
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn from_config(scene: &SceneConfig, viewport: Viewport) -> Self {
        Self {
            position: Vec3::from_array(scene.camera_position),
            target: Vec3::from_array(scene.camera_target),
            fov_y: scene.fov_y_degrees.to_radians(),
            aspect: viewport.aspect(),
            near: scene.near,
            far: scene.far,
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.aspect = viewport.aspect();
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// World-space ray through the given NDC point, starting on the near plane
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Ray {
        let inverse = self.view_projection().inverse();
        let unproject = |z: f32| {
            let p = inverse * ndc.extend(z).extend(1.0);
            p.xyz() / p.w
        };
        let near = unproject(-1.0);
        let far = unproject(1.0);
        Ray {
            origin: near,
            direction: (far - near).normalize_or_zero(),
        }
    }

    /// Canvas pixel position of a world point, or `None` when it is behind the camera
    /// or outside the frustum.
    pub fn world_to_canvas(&self, point: Vec3, canvas: &CanvasRect) -> Option<Vec2> {
        let clip = self.view_projection() * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || ndc.z.abs() > 1.0 {
            return None;
        }
        Some(Vec2::new(
            canvas.left + (ndc.x + 1.0) * 0.5 * canvas.width,
            canvas.top + (1.0 - ndc.y) * 0.5 * canvas.height,
        ))
    }
}
