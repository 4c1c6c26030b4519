/// Payload of the `tool_result` string carried by a middle-tier tool response.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    sources: Vec<ToolSource>,
}

impl ToolResult {
    pub fn new(sources: Vec<ToolSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[ToolSource] {
        &self.sources
    }

    /// Projects the sources into grounding files, keeping source order.
    pub fn into_grounding_files(self) -> Vec<GroundingFile> {
        self.sources.into_iter().map(GroundingFile::from).collect()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolSource {
    /// The id of the retrieved chunk
    chunk_id: String,
    /// The title of the document the chunk belongs to
    title: String,
    /// The chunk text
    chunk: String,
}

impl ToolSource {
    pub fn new(chunk_id: &str, title: &str, chunk: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            title: title.to_string(),
            chunk: chunk.to_string(),
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }
}

/// A source the assistant retrieved, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingFile {
    pub id: String,
    pub name: String,
    pub content: String,
}

impl From<ToolSource> for GroundingFile {
    fn from(source: ToolSource) -> Self {
        Self {
            id: source.chunk_id,
            name: source.title,
            content: source.chunk,
        }
    }
}
