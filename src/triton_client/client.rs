use anyhow::Error;
use tonic::transport::Channel;

use crate::triton_client::client::triton::grpc_inference_service_client::GrpcInferenceServiceClient;
use crate::triton_client::client::triton::{
    ModelConfigRequest, ModelConfigResponse, ModelInferRequest, ModelInferResponse,
    ServerLiveRequest,
};

pub mod triton {
    tonic::include_proto!("inference");
}

/// Thin wrapper around the generated Triton gRPC client.
#[derive(Debug, Clone)]
pub struct TritonInferenceClient {
    inner: GrpcInferenceServiceClient<Channel>,
}

impl TritonInferenceClient {
    /// new connects to the inference server at `host:port`.
    ///
    /// # Arguments
    /// * `host` - scheme and host, e.g. `http://localhost`
    /// * `port` - gRPC port of the inference server
    ///
    /// # Returns
    /// * `Result<TritonInferenceClient, Error>`
    pub async fn new(host: &str, port: u16) -> Result<Self, Error> {
        let channel = Channel::from_shared(format!("{}:{}", host, port))?
            .connect()
            .await?;
        Ok(TritonInferenceClient {
            inner: GrpcInferenceServiceClient::new(channel),
        })
    }

    /// is_server_live reports the server liveness probe.
    pub async fn is_server_live(&self) -> Result<bool, Error> {
        let mut client = self.inner.clone();
        let response = client.server_live(ServerLiveRequest {}).await?.into_inner();
        Ok(response.live)
    }

    /// model_config fetches the served configuration of one model.
    pub async fn model_config(&self, model_name: &str) -> Result<ModelConfigResponse, Error> {
        let mut client = self.inner.clone();
        let request = ModelConfigRequest {
            name: model_name.to_string(),
            version: "".to_string(),
        };
        Ok(client.model_config(request).await?.into_inner())
    }

    /// model_infer runs one inference request.
    pub async fn model_infer(&self, request: ModelInferRequest) -> Result<ModelInferResponse, Error> {
        let mut client = self.inner.clone();
        Ok(client.model_infer(request).await?.into_inner())
    }
}
