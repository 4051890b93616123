//! The active video source.

use anyhow::Result;

use super::camera::{CameraConstraints, CameraProvider, LiveStream};
use super::clip::{ClipOptions, ClipPlayer};
use super::{MediaElement, SourceKind};
use crate::auth::AuthEvent;
use crate::geometry::NativeSize;

/// Either a local clip or a live camera, never both.
pub enum VideoSource {
    File { path: String, player: ClipPlayer },
    Camera { stream: LiveStream },
}

impl VideoSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            VideoSource::File { .. } => SourceKind::File,
            VideoSource::Camera { .. } => SourceKind::Camera,
        }
    }

    fn media_mut(&mut self) -> &mut dyn MediaElement {
        match self {
            VideoSource::File { player, .. } => player,
            VideoSource::Camera { stream } => stream,
        }
    }

    fn media(&self) -> &dyn MediaElement {
        match self {
            VideoSource::File { player, .. } => player,
            VideoSource::Camera { stream } => stream,
        }
    }
}

pub struct VideoSourceManager {
    source: Option<VideoSource>,
    native_size: NativeSize,
    camera: Box<dyn CameraProvider>,
    constraints: CameraConstraints,
    clip_options: ClipOptions,
}

impl VideoSourceManager {
    pub fn new(camera: Box<dyn CameraProvider>) -> Self {
        Self {
            source: None,
            native_size: NativeSize::ZERO,
            camera,
            constraints: CameraConstraints::default(),
            clip_options: ClipOptions::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: CameraConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_clip_options(mut self, options: ClipOptions) -> Self {
        self.clip_options = options;
        self
    }

    pub fn source(&self) -> Option<&VideoSource> {
        self.source.as_ref()
    }

    pub fn source_path(&self) -> Option<&str> {
        match &self.source {
            Some(VideoSource::File { path, .. }) => Some(path),
            _ => None,
        }
    }

    pub fn native_size(&self) -> NativeSize {
        self.native_size
    }

    pub fn is_camera_active(&self) -> bool {
        matches!(self.source, Some(VideoSource::Camera { .. }))
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn media(&self) -> Option<&dyn MediaElement> {
        self.source.as_ref().map(VideoSource::media)
    }

    pub fn media_mut(&mut self) -> Option<&mut dyn MediaElement> {
        self.source.as_mut().map(VideoSource::media_mut)
    }

    /// Replace the current source with a local clip.
    ///
    /// The native size stays zero until the next decode notification.
    pub fn load_file(&mut self, path: &str) -> Result<()> {
        self.teardown();
        let player = ClipPlayer::open(path, &self.clip_options)?;
        self.source = Some(VideoSource::File {
            path: path.to_string(),
            player,
        });
        Ok(())
    }

    /// Replace the current source with a live camera.
    ///
    /// On grant the native size is the requested resolution, not the
    /// negotiated one; the first decode notification corrects it. On denial
    /// the manager is left without a source.
    pub fn open_camera(&mut self) -> Result<()> {
        self.teardown();
        let mut stream = self.camera.request(self.constraints)?;
        stream.play()?;
        self.native_size = self.constraints.size();
        self.source = Some(VideoSource::Camera { stream });
        Ok(())
    }

    /// Record decoded dimensions. Returns whether they changed.
    pub fn on_media_decoded(&mut self, size: NativeSize) -> bool {
        if self.native_size == size {
            return false;
        }
        log::debug!(
            "video decoded at {}x{} (was {}x{})",
            size.width,
            size.height,
            self.native_size.width,
            self.native_size.height
        );
        self.native_size = size;
        true
    }

    pub fn clear(&mut self) {
        self.teardown();
    }

    pub fn on_auth_event(&mut self, event: &AuthEvent) {
        if matches!(event, AuthEvent::LoggedOut) && self.has_source() {
            log::info!("session ended; releasing video source");
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.media_mut().release();
        }
        self.native_size = NativeSize::ZERO;
    }
}

impl Drop for VideoSourceManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::DeviceCameraProvider;
    use anyhow::anyhow;

    struct DenyingCamera;

    impl CameraProvider for DenyingCamera {
        fn request(&mut self, _constraints: CameraConstraints) -> Result<LiveStream> {
            Err(anyhow!(crate::media::camera::CAMERA_ACCESS_ERROR))
        }
    }

    fn manager() -> VideoSourceManager {
        VideoSourceManager::new(Box::new(DeviceCameraProvider::new("stub://camera")))
    }

    #[test]
    fn file_and_camera_are_mutually_exclusive() -> Result<()> {
        let mut videos = manager();
        videos.load_file("stub://clip?frames=10")?;
        assert_eq!(videos.source().map(VideoSource::kind), Some(SourceKind::File));
        assert_eq!(videos.native_size(), NativeSize::ZERO);

        videos.open_camera()?;
        assert!(videos.is_camera_active());
        assert_eq!(videos.source_path(), None);
        assert_eq!(videos.native_size(), NativeSize::new(640, 480));

        videos.load_file("stub://clip?frames=10")?;
        assert!(!videos.is_camera_active());
        assert_eq!(videos.native_size(), NativeSize::ZERO);
        Ok(())
    }

    #[test]
    fn decode_updates_only_on_change() -> Result<()> {
        let mut videos = manager();
        videos.load_file("stub://clip")?;
        assert!(videos.on_media_decoded(NativeSize::new(640, 480)));
        assert!(!videos.on_media_decoded(NativeSize::new(640, 480)));
        assert!(videos.on_media_decoded(NativeSize::new(1280, 720)));
        Ok(())
    }

    #[test]
    fn camera_denial_leaves_state_cleared() -> Result<()> {
        let mut videos = VideoSourceManager::new(Box::new(DenyingCamera));
        videos.load_file("stub://clip")?;
        videos.on_media_decoded(NativeSize::new(640, 480));

        assert!(videos.open_camera().is_err());
        assert!(!videos.has_source());
        assert!(!videos.is_camera_active());
        assert_eq!(videos.native_size(), NativeSize::ZERO);
        Ok(())
    }

    #[test]
    fn logout_releases_camera() -> Result<()> {
        let mut videos = manager();
        videos.open_camera()?;
        videos.on_auth_event(&AuthEvent::LoggedIn {
            username: "ops".to_string(),
        });
        assert!(videos.is_camera_active());

        videos.on_auth_event(&AuthEvent::LoggedOut);
        assert!(!videos.has_source());
        assert_eq!(videos.native_size(), NativeSize::ZERO);
        Ok(())
    }
}
