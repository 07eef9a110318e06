use std::sync::Arc;

use crate::application::render::RenderService;

#[derive(Clone)]
pub struct ApiState {
    pub render: Arc<RenderService>,
}
