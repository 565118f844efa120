//! Pyth price oracle integration.
//!
//! Resolves the Pyth and Wormhole deployments once at startup and appends the
//! price refresh sub-batch that must precede every price-dependent call.

use std::sync::Arc;

use keeper_api::{extract_vaa, PriceUpdateSource};
use keeper_chain::{Argument, CallBatch, Ledger, MoveTarget, ObjectData, ObjectId, StructTag, TypeTag};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::calls::SubBuilder;
use crate::error::{KeeperError, KeeperResult};
use crate::market::Market;

/// Read a u64 sent either as a JSON number or a decimal string.
pub(crate) fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field<'a>(data: &'a ObjectData, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(data.fields()?, |value, key| value.get(key))
}

fn deployment_error(what: &str, id: ObjectId) -> KeeperError {
    KeeperError::Oracle(anyhow::anyhow!("{what} missing from state object {id}"))
}

/// On-chain Pyth and Wormhole objects the refresh calls use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythDeployment {
    pub pyth_state: ObjectId,
    pub wormhole_state: ObjectId,
    pub pyth_package: ObjectId,
    pub wormhole_package: ObjectId,
    /// Fee in MIST paid per updated feed.
    pub base_update_fee: u64,
}

impl PythDeployment {
    /// Read package ids and the update fee from the state objects.
    pub async fn load(
        ledger: &dyn Ledger,
        pyth_state: ObjectId,
        wormhole_state: ObjectId,
    ) -> KeeperResult<Self> {
        let pyth = ledger.get_object(pyth_state).await?;
        let wormhole = ledger.get_object(wormhole_state).await?;

        let package_of = |data: &ObjectData, id: ObjectId| -> KeeperResult<ObjectId> {
            let raw = field(data, &["upgrade_cap", "fields", "package"])
                .and_then(Value::as_str)
                .ok_or_else(|| deployment_error("upgrade_cap.package", id))?;
            Ok(raw.parse()?)
        };

        let deployment = Self {
            pyth_state,
            wormhole_state,
            pyth_package: package_of(&pyth, pyth_state)?,
            wormhole_package: package_of(&wormhole, wormhole_state)?,
            base_update_fee: field(&pyth, &["base_update_fee"])
                .and_then(json_u64)
                .ok_or_else(|| deployment_error("base_update_fee", pyth_state))?,
        };

        info!(
            pyth_package = %deployment.pyth_package,
            wormhole_package = %deployment.wormhole_package,
            base_update_fee = deployment.base_update_fee,
            "Pyth deployment loaded"
        );
        Ok(deployment)
    }
}

/// Appends price refreshes using updates fetched from a [`PriceUpdateSource`].
#[derive(Debug, Clone)]
pub struct PythOracle {
    deployment: PythDeployment,
    source: Arc<dyn PriceUpdateSource>,
}

impl PythOracle {
    pub fn new(deployment: PythDeployment, source: Arc<dyn PriceUpdateSource>) -> Self {
        Self { deployment, source }
    }

    /// Find the shared price info object for `feed_id` through the Pyth price table.
    #[instrument(skip(self, ledger))]
    pub async fn price_info_object(&self, ledger: &dyn Ledger, feed_id: &str) -> KeeperResult<ObjectId> {
        let table = ledger
            .get_dynamic_field(
                self.deployment.pyth_state,
                json!({ "type": "vector<u8>", "value": "price_info" }),
            )
            .await?;

        let table_type = table
            .object_type
            .as_deref()
            .ok_or_else(|| deployment_error("price table type", self.deployment.pyth_state))?;
        let key_type = table_type
            .parse::<StructTag>()?
            .type_params
            .into_iter()
            .next()
            .ok_or_else(|| deployment_error("price table key type", self.deployment.pyth_state))?;

        let feed_bytes = hex::decode(feed_id.trim_start_matches("0x"))
            .map_err(|e| KeeperError::Oracle(anyhow::anyhow!("invalid feed id {feed_id}: {e}")))?;

        let entry = ledger
            .get_dynamic_field(
                table.object_id,
                json!({ "type": key_type.to_string(), "value": { "bytes": feed_bytes } }),
            )
            .await?;

        let id = field(&entry, &["value"])
            .and_then(Value::as_str)
            .ok_or_else(|| KeeperError::Oracle(anyhow::anyhow!("no price info object for feed {feed_id}")))?;
        debug!(price_info = %id, "Resolved price info object");
        Ok(id.parse()?)
    }

    /// Price refresh sub-builder for the market's feed.
    ///
    /// Appends exactly [`SubBuilder::PriceFeedUpdate`]`.call_count()` calls.
    #[instrument(skip_all, fields(market = %market.name))]
    pub async fn append_price_update(&self, batch: &mut CallBatch, market: &Market) -> KeeperResult<()> {
        let update = self
            .source
            .latest_price_update(&market.price_feed_id)
            .await
            .map_err(KeeperError::Oracle)?;
        let vaa = extract_vaa(&update).map_err(KeeperError::Oracle)?;

        let d = &self.deployment;
        let before = batch.len();

        let wormhole_state = batch.object(d.wormhole_state, false);
        let vaa_arg = batch.pure(vaa)?;
        let clock = batch.clock();
        let verified_vaa = batch.move_call(
            MoveTarget::new(d.wormhole_package, "vaa", "parse_and_verify"),
            vec![],
            vec![wormhole_state, vaa_arg, clock],
        );

        let pyth_state = batch.object(d.pyth_state, false);
        let update_arg = batch.pure(update.as_slice())?;
        let hot_potato = batch.move_call(
            MoveTarget::new(d.pyth_package, "pyth", "create_authenticated_price_infos_using_accumulator"),
            vec![],
            vec![pyth_state, update_arg, verified_vaa, clock],
        );

        let fee = batch.pure(&d.base_update_fee)?;
        let fee_coins = batch.split_coins(Argument::GasCoin, vec![fee]);

        let price_info = batch.object(market.price_info_object, true);
        let hot_potato = batch.move_call(
            MoveTarget::new(d.pyth_package, "pyth", "update_single_price_feed"),
            vec![],
            vec![pyth_state, hot_potato, price_info, fee_coins.nested(0), clock],
        );

        let price_info_type = TypeTag::structure(StructTag::new(d.pyth_package, "price_info", "PriceInfo", vec![]));
        batch.move_call(
            MoveTarget::new(d.pyth_package, "hot_potato_vector", "destroy"),
            vec![price_info_type],
            vec![hot_potato],
        );

        SubBuilder::PriceFeedUpdate.check_appended(before, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{accumulator_update, object_data, sample_deployment, sample_market, MockLedger, StaticPriceSource};
    use keeper_chain::{Command, SuiAddress};

    #[tokio::test]
    async fn test_price_update_appends_declared_calls() {
        let oracle = PythOracle::new(
            sample_deployment(),
            Arc::new(StaticPriceSource::new(accumulator_update(&[5, 6, 7]))),
        );
        let market = sample_market();
        let mut batch = CallBatch::new();
        oracle.append_price_update(&mut batch, &market).await.unwrap();

        assert_eq!(batch.len(), SubBuilder::PriceFeedUpdate.call_count());
        assert_eq!(
            batch.call_labels(),
            vec![
                "vaa::parse_and_verify",
                "pyth::create_authenticated_price_infos_using_accumulator",
                "SplitCoins",
                "pyth::update_single_price_feed",
                "hot_potato_vector::destroy",
            ]
        );
        let Command::MoveCall(update) = &batch.commands()[3] else {
            panic!("expected move call");
        };
        assert_eq!(update.arguments[1], Argument::Result(1));
        assert_eq!(update.arguments[3], Argument::NestedResult(2, 0));
    }

    #[tokio::test]
    async fn test_price_update_fails_without_payload() {
        let oracle = PythOracle::new(sample_deployment(), Arc::new(StaticPriceSource::failing()));
        let mut batch = CallBatch::new();
        let err = oracle.append_price_update(&mut batch, &sample_market()).await.unwrap_err();
        assert!(matches!(err, KeeperError::Oracle(_)));
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_load_deployment() {
        let ledger = MockLedger::new();
        let pyth_state = SuiAddress::new([1; 32]);
        let wormhole_state = SuiAddress::new([2; 32]);
        let pyth_pkg = SuiAddress::new([3; 32]);
        let wormhole_pkg = SuiAddress::new([4; 32]);

        ledger.set_object(object_data(
            pyth_state,
            None,
            json!({
                "base_update_fee": "1",
                "upgrade_cap": { "fields": { "package": pyth_pkg.to_string() } }
            }),
        ));
        ledger.set_object(object_data(
            wormhole_state,
            None,
            json!({ "upgrade_cap": { "fields": { "package": wormhole_pkg.to_string() } } }),
        ));

        let deployment = PythDeployment::load(&ledger, pyth_state, wormhole_state).await.unwrap();
        assert_eq!(deployment.pyth_package, pyth_pkg);
        assert_eq!(deployment.wormhole_package, wormhole_pkg);
        assert_eq!(deployment.base_update_fee, 1);
    }

    #[test]
    fn test_json_u64() {
        assert_eq!(json_u64(&json!(6)), Some(6));
        assert_eq!(json_u64(&json!("6")), Some(6));
        assert_eq!(json_u64(&json!("x")), None);
        assert_eq!(json_u64(&json!(null)), None);
    }
}
