//! The host-facing driver: owns the current [`Scene`], feeds it resource
//! loads and advances it frame by frame.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::config::BrowserConfig;
use crate::engine::NodeId;
use crate::error::{Result, VrmlError};
use crate::field::Vec3f;
use crate::node::MetatypeRegistry;
use crate::resource::{LoadTicket, ResourceFetcher, ResourceLoader, ResourceStream};
use crate::scene::{LoadPurpose, LoadWarning, Scene};
use crate::viewer::Viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrowserState {
    Unloaded,
    Loading,
    Ready,
}

pub struct Browser {
    registry: MetatypeRegistry,
    config: BrowserConfig,
    state: BrowserState,
    scene: Option<Scene>,
    loader: ResourceLoader,
    pending: HashMap<LoadTicket, LoadPurpose>,
}

impl Browser {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, config: BrowserConfig) -> Self {
        Self {
            registry: MetatypeRegistry::with_builtins(),
            config,
            state: BrowserState::Unloaded,
            scene: None,
            loader: ResourceLoader::new(fetcher),
            pending: HashMap::new(),
        }
    }

    pub fn state(&self) -> BrowserState {
        self.state
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    fn scene_or_err(&mut self) -> Result<&mut Scene> {
        self.scene.as_mut().ok_or(VrmlError::NotLoaded)
    }

    fn set_state(&mut self, state: BrowserState) {
        if self.state != state {
            debug!("browser {:?} -> {state:?}", self.state);
            self.state = state;
        }
    }

    /// Fetch `url` on the calling thread and load it as the new world.
    pub fn load_url(&mut self, url: &str) -> Result<()> {
        self.set_state(BrowserState::Loading);
        match self.loader.fetcher().fetch(url) {
            Ok(stream) => self.load_stream(&stream),
            Err(error) => {
                self.unload();
                Err(error.into())
            }
        }
    }

    pub fn load_stream(&mut self, stream: &ResourceStream) -> Result<()> {
        match stream.text() {
            Ok(text) => self.load_str(text, stream.url()),
            Err(error) => {
                self.unload();
                Err(error.into())
            }
        }
    }

    /// Replace the current world with the one in `source`. On failure no
    /// world is loaded.
    pub fn load_str(&mut self, source: &str, url: &str) -> Result<()> {
        self.unload();
        self.set_state(BrowserState::Loading);
        match Scene::load(source, url, self.registry.clone(), self.config.clone()) {
            Ok(scene) => {
                self.scene = Some(scene);
                self.dispatch_requests();
                self.set_state(BrowserState::Ready);
                Ok(())
            }
            Err(error) => {
                self.set_state(BrowserState::Unloaded);
                Err(error)
            }
        }
    }

    /// Tear down the current world, if any.
    fn unload(&mut self) {
        self.loader.join_all();
        self.pending.clear();
        if let Some(mut scene) = self.scene.take() {
            scene.shutdown();
        }
        self.set_state(BrowserState::Unloaded);
    }

    /// Start loads for everything the scene asked for since the last call.
    fn dispatch_requests(&mut self) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        for request in scene.take_load_requests() {
            let ticket = self.loader.start(request.urls);
            self.pending.insert(ticket, request.purpose);
        }
    }

    fn deliver(&mut self, finished: Vec<(LoadTicket, crate::resource::LoadResult)>) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        for (ticket, result) in finished {
            match self.pending.remove(&ticket) {
                Some(purpose) => scene.complete_load(&purpose, result),
                None => debug!("{ticket} finished for a world that is gone"),
            }
        }
    }

    /// One frame: hand finished loads to the scene, update time-dependent
    /// nodes and drain events. Returns whether anything needs redrawing.
    pub fn update(&mut self, time: f64) -> Result<bool> {
        if self.scene.is_none() {
            return Err(VrmlError::NotLoaded);
        }
        let finished = self.loader.poll();
        self.deliver(finished);
        let scene = self.scene_or_err()?;
        scene.update(time);
        let modified = scene.is_modified();
        self.dispatch_requests();
        Ok(modified)
    }

    pub fn render(&mut self, viewer: &mut dyn Viewer) -> Result<()> {
        self.scene_or_err()?.render(viewer);
        Ok(())
    }

    /// Pointer input on geometry rendered while `node` was sensitive.
    pub fn sensitive_event(&mut self, node: NodeId, timestamp: f64, over: bool, active: bool, hit_point: Vec3f) -> Result<()> {
        let scene = self.scene_or_err()?;
        scene.sensitive_event(node, timestamp, over, active, hit_point)?;
        scene.process_events(timestamp);
        Ok(())
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        match &self.scene {
            Some(scene) => scene.warnings(),
            None => &[],
        }
    }

    /// Block until every load, including the ones the loaded content asks
    /// for in turn, has finished and been handed to the scene.
    pub fn wait_for_loads(&mut self) {
        while self.loader.in_flight() > 0 {
            let finished = self.loader.join_all();
            self.deliver(finished);
            if let Some(scene) = self.scene.as_mut() {
                let now = scene.now();
                scene.initialize_pending(now);
                scene.process_events(now);
            }
            self.dispatch_requests();
        }
    }

    /// Join outstanding loads, then shut the world down.
    pub fn shutdown(&mut self) {
        self.unload();
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;
    use crate::resource::StaticFetcher;
    use crate::viewer::{RecordingViewer, ViewerCall};

    const WORLD: &str = "#VRML V2.0 utf8\n\
        EXTERNPROTO Lamp [ exposedField SFColor color ] \"lib/lamps.wrl#Lamp\"\n\
        DEF L Lamp { color 1 0 0 }\n\
        Inline { url \"parts/cube.wrl\" }";

    const LAMPS: &str = "#VRML V2.0 utf8\n\
        PROTO Lamp [ exposedField SFColor color 1 1 1 ] { PointLight { color IS color } }";

    const CUBE: &str = "#VRML V2.0 utf8\nShape { geometry Box { } }";

    fn browser() -> Browser {
        let fetcher = StaticFetcher::new()
            .with("worlds/main.wrl", WORLD)
            .with("worlds/lib/lamps.wrl", LAMPS)
            .with("worlds/parts/cube.wrl", CUBE)
            .with("broken.wrl", "#VRML V2.0 utf8\nGroup {");
        Browser::new(Arc::new(fetcher), BrowserConfig::default())
    }

    #[test]
    fn nothing_to_update_before_a_load() {
        let mut browser = browser();
        assert_eq!(browser.state(), BrowserState::Unloaded);
        assert!(matches!(browser.update(0.0), Err(VrmlError::NotLoaded)));
        assert!(browser.warnings().is_empty());
    }

    #[test]
    fn loads_pull_in_inlines_and_extern_protos() {
        let mut browser = browser();
        browser.load_url("worlds/main.wrl").unwrap();
        assert_eq!(browser.state(), BrowserState::Ready);
        browser.update(0.0).unwrap();
        browser.wait_for_loads();

        let scene = browser.scene().unwrap();
        let lamp = scene.find_node("L").unwrap();
        let light = scene.implementation(lamp);
        assert_ne!(light, lamp);
        assert_eq!(
            scene.get_field(light, "color").unwrap(),
            &FieldValue::SfColor(crate::field::Color::new(1.0, 0.0, 0.0))
        );

        let mut viewer = RecordingViewer::new();
        browser.render(&mut viewer).unwrap();
        let calls = viewer.take_calls();
        assert!(calls.iter().any(|call| matches!(call, ViewerCall::InsertPointLight { .. })));
        assert!(calls.iter().any(|call| matches!(call, ViewerCall::InsertBox { .. })));
    }

    #[test]
    fn update_reports_pending_redraws() {
        let mut browser = browser();
        browser.load_str(CUBE, "cube.wrl").unwrap();
        assert!(browser.update(0.0).unwrap());
        browser.render(&mut RecordingViewer::new()).unwrap();
        assert!(!browser.update(0.1).unwrap());
    }

    #[test]
    fn failed_loads_leave_nothing_loaded() {
        let mut browser = browser();
        browser.load_str(CUBE, "cube.wrl").unwrap();

        let error = browser.load_url("broken.wrl").unwrap_err();
        assert!(matches!(error, VrmlError::InvalidVrml(_)));
        assert_eq!(browser.state(), BrowserState::Unloaded);
        assert!(browser.scene().is_none());

        let error = browser.load_url("absent.wrl").unwrap_err();
        assert!(matches!(error, VrmlError::Resource(_)));
        assert_eq!(browser.state(), BrowserState::Unloaded);
    }

    #[test]
    fn unreachable_references_only_warn() {
        let mut browser = browser();
        browser
            .load_str("#VRML V2.0 utf8\nInline { url \"nowhere.wrl\" }", "main.wrl")
            .unwrap();
        browser.update(0.0).unwrap();
        browser.wait_for_loads();
        assert_eq!(browser.state(), BrowserState::Ready);
        assert_eq!(browser.warnings().len(), 1);
    }

    #[test]
    fn touch_sensors_receive_pointer_input() {
        let mut browser = browser();
        browser
            .load_str(
                "#VRML V2.0 utf8\n\
                 DEF Button Group { children [ DEF T TouchSensor { } Shape { geometry Box { } } ] }",
                "button.wrl",
            )
            .unwrap();
        browser.update(0.0).unwrap();
        let button = browser.scene().unwrap().find_node("Button").unwrap();
        browser.sensitive_event(button, 1.0, true, false, Vec3f::ZERO).unwrap();

        let scene = browser.scene().unwrap();
        let sensor = scene.find_node("T").unwrap();
        assert_eq!(scene.event_value(sensor, "isOver").unwrap(), &FieldValue::SfBool(true));
    }

    #[test]
    fn shutdown_unloads() {
        let mut browser = browser();
        browser.load_url("worlds/main.wrl").unwrap();
        browser.update(0.0).unwrap();
        browser.shutdown();
        assert_eq!(browser.state(), BrowserState::Unloaded);
        assert_eq!(browser.loader.in_flight(), 0);
        assert!(matches!(browser.render(&mut RecordingViewer::new()), Err(VrmlError::NotLoaded)));
    }
}
