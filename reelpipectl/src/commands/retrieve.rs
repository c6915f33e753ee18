use std::sync::Arc;

use tracing::warn;

use reelpipe_core::retrieval::{InstagramRetriever, RetrievalLoop, RetrievalReport};

use crate::{AppContext, Result};

pub(crate) async fn execute(context: &AppContext) -> Result<RetrievalReport> {
    let config = context.config();
    let store = context.session_store();
    let retriever = if store.exists() {
        InstagramRetriever::from_session(&config.retrieval, &store).await?
    } else {
        warn!(path = %store.path().display(), "no saved session; retrieving without cookies");
        InstagramRetriever::new(&config.retrieval, &[])?
    };

    let runner = RetrievalLoop::from_pipeline(config, Arc::new(retriever))?;
    Ok(runner.run(&context.queue()).await?)
}
