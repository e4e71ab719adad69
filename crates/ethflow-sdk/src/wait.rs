//! Bounded waits for inclusion and deployment

use std::time::Duration;

use ethflow_primitives::{Address, H256};
use ethflow_types::{Receipt, SignedTransaction};

use crate::{ChainClient, SdkError};

/// Polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Overall deadline
    pub timeout: Duration,
    /// Delay between receipt queries
    pub poll_interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(60), poll_interval: Duration::from_millis(500) }
    }
}

impl WaitConfig {
    /// Deadline with the default poll interval
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, ..Self::default() }
    }
}

/// Poll until the receipt for `hash` exists
///
/// Fails with [`SdkError::Timeout`] once `config.timeout` elapses. Dropping
/// the future cancels the wait.
pub async fn wait_mined(
    client: &dyn ChainClient,
    hash: H256,
    config: &WaitConfig,
) -> Result<Receipt, SdkError> {
    let poll = async {
        loop {
            if let Some(receipt) = client.transaction_receipt(&hash).await? {
                return Ok::<Receipt, SdkError>(receipt);
            }
            tracing::trace!(%hash, "receipt not yet available");
            tokio::time::sleep(config.poll_interval).await;
        }
    };

    match tokio::time::timeout(config.timeout, poll).await {
        Ok(result) => {
            if let Ok(receipt) = &result {
                tracing::debug!(%hash, block = receipt.block_number, status = ?receipt.status, "transaction mined");
            }
            result
        }
        Err(_) => {
            tracing::warn!(%hash, timeout = ?config.timeout, "transaction not mined in time");
            Err(SdkError::Timeout(format!("transaction {hash} not mined within {:?}", config.timeout)))
        }
    }
}

/// Wait for a creation to be mined and check that code landed
pub async fn wait_deployed(
    client: &dyn ChainClient,
    tx: &SignedTransaction,
    config: &WaitConfig,
) -> Result<Address, SdkError> {
    if !tx.is_contract_creation() {
        return Err(SdkError::NotContractCreation);
    }
    let receipt = wait_mined(client, tx.hash(), config).await?;
    let address = receipt.contract_address.ok_or(SdkError::NotContractCreation)?;
    let code = client.code_at(&address, Some(receipt.block_number)).await?;
    if code.is_empty() {
        return Err(SdkError::NoCode(address));
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RpcClient;

    #[tokio::test]
    async fn test_wait_mined_times_out() {
        let (client, transport) = RpcClient::new_mock();
        let config = WaitConfig { timeout: Duration::from_millis(60), poll_interval: Duration::from_millis(10) };

        let err = wait_mined(&client, H256::ZERO, &config).await.unwrap_err();
        assert!(err.is_timeout());
        let polls = transport
            .requests()
            .iter()
            .filter(|(m, _)| m == "eth_getTransactionReceipt")
            .count();
        assert!(polls >= 2);
    }

    #[tokio::test]
    async fn test_wait_mined_propagates_errors() {
        let (client, transport) = RpcClient::new_mock();
        transport.set_response(
            "eth_getTransactionReceipt",
            serde_json::json!({"error": {"code": -32000, "message": "boom"}}),
        );
        let err = wait_mined(&client, H256::ZERO, &WaitConfig::default()).await.unwrap_err();
        assert!(matches!(err, SdkError::Rpc { code: -32000, .. }));
    }

    #[test]
    fn test_wait_config_default() {
        let config = WaitConfig::with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, WaitConfig::default().poll_interval);
    }
}
