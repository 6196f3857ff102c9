//! Data committed from a tab's main thread to the UI/compositor thread each
//! render, grounded on the original implementation's
//! `background/commit_data.py`.

use crate::draw::DrawCommand;

#[derive(Clone)]
pub struct CommitData {
    pub display_list: Vec<DrawCommand>,
    pub document_height: f32,
    pub scroll: f32,
    pub url: Option<String>,
    pub tab_id: u64,
}
