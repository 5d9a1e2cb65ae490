/// Maps one piece of row text to a vector.
///
/// Implementations are shared by every worker of a run and must tolerate
/// concurrent calls.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> { (**self).embed(text) }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> { (**self).embed(text) }
}
