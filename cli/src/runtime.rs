// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Runtime composition
//!
//! Builds every backend and application service from a [`TierMemConfig`].
//! This is the only place that picks concrete implementations.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use tiermem_cortex::application::{
    ChatService, ClassificationPipeline, ManagementLoop, ManagementOrchestrator, MemoryEnhancer, MemoryService,
    MemoryTaskDispatcher, MessageService, RetrievalEngine, TierScheduler,
};
use tiermem_cortex::domain::config::{StorageBackend, TierMemConfig, VectorBackend};
use tiermem_cortex::infrastructure::{
    Database, HttpInferenceClient, InMemoryDatabase, InMemoryVectorStore, LocalTaskQueue,
    OllamaCompletionProvider, QdrantVectorStore,
};
use tiermem_cortex::{CompletionProvider, InferenceGateway, Repositories, UnitOfWork, VectorStore};

pub struct Runtime {
    pub config: TierMemConfig,
    pub queue: Arc<LocalTaskQueue>,
    pub dispatcher: Arc<MemoryTaskDispatcher>,
    pub orchestrator: Arc<ManagementOrchestrator>,
    pub chats: ChatService,
    pub memories: MemoryService,
    pub messages: MessageService,
}

impl Runtime {
    pub async fn build(config: TierMemConfig) -> Result<Self> {
        let (repositories, uow) = storage(&config).await?;
        let vectors = vector_store(&config).await?;

        let inference: Arc<dyn InferenceGateway> = Arc::new(
            HttpInferenceClient::new(&config.spec.inference.endpoint, config.spec.inference.timeout)
                .context("Failed to create inference client")?,
        );

        let memory = &config.spec.memory;
        let mut pipeline = ClassificationPipeline::new(
            inference.clone(),
            repositories.clone(),
            vectors.clone(),
            memory.similarity_threshold,
        );
        if let Some(enhancement) = &config.spec.enhancement {
            let completion = OllamaCompletionProvider::new(
                &enhancement.endpoint,
                &enhancement.model,
                enhancement.timeout,
            )
            .context("Failed to create completion client")?;
            if let Err(e) = completion.health_check().await {
                warn!(error = %e, endpoint = %enhancement.endpoint, "Completion model is not reachable yet");
            }
            info!(model = %enhancement.model, "Memory enhancement enabled");
            pipeline = pipeline.with_enhancer(MemoryEnhancer::new(Arc::new(completion), inference.clone()));
        }

        let scheduler = Arc::new(TierScheduler::new(uow.clone(), vectors.clone(), memory.clone()));
        let orchestrator = Arc::new(ManagementOrchestrator::new(
            repositories.chats.clone(),
            scheduler,
            memory.max_simultaneous_tasks,
        ));
        let dispatcher = Arc::new(MemoryTaskDispatcher::new(Arc::new(pipeline), orchestrator.clone()));
        let queue = Arc::new(LocalTaskQueue::new(config.spec.worker.clone()));

        let chats = ChatService::new(repositories.chats.clone());
        let memories = MemoryService::new(
            chats.clone(),
            RetrievalEngine::new(inference, repositories.clone(), vectors.clone()),
            repositories,
            uow,
            vectors,
        );
        let messages = MessageService::new(chats.clone(), queue.clone());

        Ok(Self {
            config,
            queue,
            dispatcher,
            orchestrator,
            chats,
            memories,
            messages,
        })
    }

    pub fn management_loop(&self) -> Arc<ManagementLoop> {
        Arc::new(ManagementLoop::new(
            self.queue.clone(),
            self.config.spec.memory.management_period,
        ))
    }
}

async fn storage(config: &TierMemConfig) -> Result<(Repositories, Arc<dyn UnitOfWork>)> {
    let storage = &config.spec.storage;
    match storage.backend {
        StorageBackend::InMemory => {
            warn!("Using in-memory storage, memories are lost on exit");
            let db = InMemoryDatabase::new();
            Ok((db.repositories(), db.unit_of_work()))
        }
        StorageBackend::Postgres => {
            let url = storage
                .url
                .as_deref()
                .context("storage.url is required for the postgres backend")?;
            let db = Database::connect(url, storage.max_connections).await?;
            db.migrate().await?;
            info!("Connected to PostgreSQL");
            Ok((db.repositories(), db.unit_of_work()))
        }
    }
}

async fn vector_store(config: &TierMemConfig) -> Result<Arc<dyn VectorStore>> {
    let vectors = &config.spec.vector_store;
    match vectors.backend {
        VectorBackend::InMemory => {
            warn!("Using in-memory vector store, embeddings are lost on exit");
            Ok(Arc::new(InMemoryVectorStore::with_dimension(vectors.vector_size as usize)))
        }
        VectorBackend::Qdrant => {
            let url = vectors
                .url
                .as_deref()
                .context("vector_store.url is required for the qdrant backend")?;
            let store = QdrantVectorStore::new(url, vectors.collection.clone(), vectors.vector_size)?;
            store.initialize().await?;
            info!(collection = %vectors.collection, "Connected to Qdrant");
            Ok(Arc::new(store))
        }
    }
}
