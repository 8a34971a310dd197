// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Block connect: signer scan of every transaction, notarization acceptance, ratifications and
//! the per-block records of the state log.

use crate::cc_cache::{CrossChainCache, CrossChainEntry};
use crate::chain_state::ChainState;
use crate::notary::{NotaryLookup, NotaryResolver};
use crate::opret::{NotarizationCandidate, NotarizationParser, OpReturnKind};
use crate::registry::ChainStateRegistry;
use crate::reorg_guard::ReorgGuard;
use crate::signed_masks::SignedMasksLog;
use crate::store::ChainStateStore;
use dpow_exports::{ChainView, ConsensusViolation, DpowConfig, DpowResult};
use dpow_hash::hash::Hash160;
use dpow_logging::dpow_trace;
use dpow_models::block::{Block, Transaction, TxIn};
use dpow_models::constants::{MAX_NOTARIES, PUBKEY_SIZE_BYTES};
use dpow_models::event::{Event, NotarizedEvent, PubkeysEvent};
use dpow_models::pubkey::PublicKey;
use dpow_models::script::{p2pk_pubkey, p2pkh_hash, P2PKH_SCRIPT_LEN, P2PK_SCRIPT_LEN};
use tracing::{debug, info, warn};

/// Output scripts outside these bounds are not inspected
const MIN_SCRIPT_LEN: usize = 4;
const MAX_SCRIPT_LEN: usize = 10001;

/// Result of connecting a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    /// no notarization seen, always the result outside validation-only mode
    NoNotarization,
    /// exactly one notarization, in transaction 1
    ValidNotarization,
    /// the block must be rejected
    Invalid(ConsensusViolation),
}

impl ConnectStatus {
    /// Status code handed back to the node: 0, 1 or -1
    pub fn code(&self) -> i32 {
        match self {
            ConnectStatus::NoNotarization => 0,
            ConnectStatus::ValidNotarization => 1,
            ConnectStatus::Invalid(_) => -1,
        }
    }

    fn from_positions(positions: &[usize]) -> Self {
        match positions {
            [] => ConnectStatus::NoNotarization,
            [1] => ConnectStatus::ValidNotarization,
            [index] => {
                ConnectStatus::Invalid(ConsensusViolation::NotarizationAtWrongIndex(*index))
            }
            _ => ConnectStatus::Invalid(ConsensusViolation::MultipleNotarizations),
        }
    }
}

/// Index of the notary `script` pays to.
///
/// Pay-to-pubkey-hash sized scripts only ever match the first notary.
pub fn notary_position(
    script: &[u8],
    notaries: &[PublicKey],
    first_notary_hash: Option<&Hash160>,
) -> Option<usize> {
    match script.len() {
        P2PKH_SCRIPT_LEN => {
            let hash = p2pkh_hash(script)?;
            first_notary_hash
                .filter(|first| first.matches(hash))
                .map(|_| 0)
        }
        P2PK_SCRIPT_LEN => {
            let key = &script[1..1 + PUBKEY_SIZE_BYTES];
            notaries
                .iter()
                .position(|notary| notary.as_bytes().as_slice() == key)
        }
        _ => None,
    }
}

/// Block being connected, and the signers of the transaction under scan
struct TxContext<'a> {
    block: &'a Block,
    height: i32,
    tx_index: usize,
    notarized: bool,
    signed_mask: u64,
    just_check: bool,
}

/// What the outputs of one transaction carried
#[derive(Debug, Default)]
struct TxScan {
    special: bool,
    ratification: bool,
    notarized_height: i32,
    paid_notary: Option<usize>,
    notary_outputs: u64,
    mixed_notaries: bool,
    notarization_found: bool,
}

/// Applies connected blocks to the state of the chain this node runs
#[derive(Debug)]
pub struct NotarizationIntegrator {
    config: DpowConfig,
    resolver: NotaryResolver,
    parser: NotarizationParser,
    guard: ReorgGuard,
    cc_cache: CrossChainCache,
    signed_masks: SignedMasksLog,
    hwm: i32,
}

impl NotarizationIntegrator {
    /// Integrator for `config.own_symbol`
    pub fn new(config: DpowConfig) -> Self {
        let resolver = NotaryResolver::new(config.clone());
        let parser = NotarizationParser::new(&config.own_symbol, config.own_is_home());
        let guard = ReorgGuard::new(&config.own_symbol, config.rewind_floor);
        let signed_masks = SignedMasksLog::new(&config.signed_masks_path());
        NotarizationIntegrator {
            config,
            resolver,
            parser,
            guard,
            cc_cache: CrossChainCache::new(),
            signed_masks,
            hwm: 0,
        }
    }

    /// Fork tracking of the notarization validation
    pub fn guard(&self) -> &ReorgGuard {
        &self.guard
    }

    /// Cross-chain data of the accepted notarizations
    pub fn cc_cache(&self) -> &CrossChainCache {
        &self.cc_cache
    }

    /// Highest height connected so far
    pub fn high_water_mark(&self) -> i32 {
        self.hwm
    }

    /// Notary sets in use
    pub fn resolver(&self) -> &NotaryResolver {
        &self.resolver
    }

    /// Connect `block` at `height`.
    ///
    /// With `just_check` nothing is recorded and the status tells whether the block holds at
    /// most one notarization, in transaction 1. Otherwise the state of the own chain is updated
    /// and the status is always [`ConnectStatus::NoNotarization`].
    pub fn connect_block(
        &mut self,
        registry: &mut ChainStateRegistry,
        chain: &dyn ChainView,
        block: &Block,
        height: i32,
        just_check: bool,
    ) -> DpowResult<ConnectStatus> {
        let store = registry.get_mut(&self.config.own_symbol)?;
        self.track_high_water_mark(store, block, height, just_check)?;
        if let Some(tip) = chain.tip() {
            store.state_mut().set_current_height(tip.height);
        }

        let notaries = match self.resolver.notaries(height, block.time, store.state()) {
            NotaryLookup::Active(notaries) => notaries,
            lookup => {
                debug!(
                    "{}: not scanning block {} at height {}: {:?}",
                    self.config.own_symbol, block.hash, height, lookup
                );
                Vec::new()
            }
        };
        let first_notary_hash = notaries.first().map(PublicKey::hash160);

        let mut positions = Vec::new();
        if !notaries.is_empty() {
            for (tx_index, tx) in block.transactions.iter().enumerate() {
                if !just_check && tx_index > 1 && self.config.notary_pay {
                    break;
                }
                let found = self.connect_transaction(
                    store,
                    chain,
                    block,
                    height,
                    tx_index,
                    tx,
                    &notaries,
                    first_notary_hash.as_ref(),
                    just_check,
                )?;
                if found {
                    positions.push(tx_index);
                }
            }
        }

        if !just_check && height == self.hwm {
            store.record_block(height, block.time)?;
        }
        if !just_check {
            return Ok(ConnectStatus::NoNotarization);
        }
        let status = ConnectStatus::from_positions(&positions);
        if let ConnectStatus::Invalid(violation) = &status {
            warn!(
                "{}: block {} at height {} rejected: {}",
                self.config.own_symbol, block.hash, height, violation
            );
        }
        Ok(status)
    }

    fn track_high_water_mark(
        &mut self,
        store: &mut ChainStateStore,
        block: &Block,
        height: i32,
        just_check: bool,
    ) -> DpowResult<()> {
        if height > self.hwm {
            self.hwm = height;
            return Ok(());
        }
        if height != self.hwm {
            let purged = self.cc_cache.purge_from(height);
            warn!(
                "{}: reorg to height {} below high water mark {} (t.{}), {} cross-chain entries purged",
                self.config.own_symbol,
                height,
                self.hwm,
                block.time,
                purged
            );
            dpow_trace!("connect.reorg", {
                "symbol": self.config.own_symbol,
                "height": height,
                "hwm": self.hwm,
                "purged": purged
            });
            self.hwm = height;
        }
        if !just_check {
            store.record_rewind(height, block.time)?;
        }
        Ok(())
    }

    fn has_quorum(&self, height: i32, signed_mask: u64, num_notaries: usize) -> bool {
        let num_valid = signed_mask.count_ones();
        let min_ratify = self.config.min_ratify(height);
        ((height < self.config.notary.min_ratify_height || signed_mask & 1 != 0)
            && num_valid >= min_ratify)
            || (num_valid >= min_ratify && !self.config.own_is_home())
            || num_valid as usize > num_notaries / 5
    }

    /// Returns whether a notarization usable for the validation-only check was found
    #[allow(clippy::too_many_arguments)]
    fn connect_transaction(
        &mut self,
        store: &mut ChainStateStore,
        chain: &dyn ChainView,
        block: &Block,
        height: i32,
        tx_index: usize,
        tx: &Transaction,
        notaries: &[PublicKey],
        first_notary_hash: Option<&Hash160>,
        just_check: bool,
    ) -> DpowResult<bool> {
        let mut signed_mask: u64 = if height < self.config.notary.early_signed_mask_height {
            1
        } else {
            0
        };
        for (vin, input) in tx.inputs.iter().enumerate() {
            if tx_index == 0 && vin == 0 {
                continue;
            }
            match signer_index(chain, input, notaries, first_notary_hash) {
                Some(index) if index < MAX_NOTARIES => signed_mask |= 1u64 << index,
                _ => {}
            }
        }

        let mut notarized = self.has_quorum(height, signed_mask, notaries.len());
        if notarized && !just_check && !self.config.own_is_home() {
            self.signed_masks.append(height, signed_mask)?;
            info!(
                "[{}] ht.{} txi.{} signedmask.{:x} numvins.{} numvouts.{} notarized",
                self.config.own_symbol,
                height,
                tx_index,
                signed_mask,
                tx.inputs.len(),
                tx.outputs.len()
            );
        }
        if self.config.regtest && height % 7 == 0 {
            notarized = true;
            store
                .state_mut()
                .force_notarized(height, block.hash, tx.txid);
        }

        let ctx = TxContext {
            block,
            height,
            tx_index,
            notarized,
            signed_mask,
            just_check,
        };
        let mut scan = TxScan::default();
        for (vout, output) in tx.outputs.iter().enumerate() {
            let script = &output.script_pubkey;
            if !(MIN_SCRIPT_LEN..=MAX_SCRIPT_LEN).contains(&script.len()) {
                continue;
            }
            if let Some(pubkey) = p2pk_pubkey(script) {
                self.track_notary_output(store.state(), &mut scan, pubkey, &ctx, vout);
                continue;
            }
            match self.parser.parse(script, vout) {
                Some(OpReturnKind::Notarization(candidate)) => {
                    if self.apply_notarization(store, chain, &ctx, &mut scan, candidate)? {
                        scan.notarization_found = true;
                    }
                }
                Some(OpReturnKind::Ratification) => {
                    info!("{}: ratification output in tx {}", self.config.own_symbol, tx.txid);
                    scan.ratification = true;
                }
                Some(OpReturnKind::Other) | None => {}
            }
        }
        if let (Some(notary_id), false) = (scan.paid_notary, scan.mixed_notaries) {
            debug!(
                "{}: tx {} pays notary {} (outputs {:x})",
                self.config.own_symbol, tx.txid, notary_id, scan.notary_outputs
            );
        }

        if !just_check
            && notarized
            && (scan.notarized_height != 0 || scan.special)
            && scan.special
            && scan.ratification
            && tx.outputs.len() > 2
        {
            info!(
                "{} NOTARY SIGNED.{:x} numvins.{} ht.{} txi.{} notaryht.{}",
                self.config.own_symbol,
                signed_mask,
                tx.inputs.len(),
                height,
                tx_index,
                scan.notarized_height
            );
            if self.config.own_is_home() && height < self.config.notary.ratification_max_height {
                self.ratify(store, tx, height, signed_mask, notaries.len())?;
            }
        }
        Ok(scan.notarization_found)
    }

    fn track_notary_output(
        &self,
        state: &ChainState,
        scan: &mut TxScan,
        pubkey: &[u8],
        ctx: &TxContext,
        vout: usize,
    ) {
        if pubkey == self.config.crypto777_pubkey.as_bytes().as_slice() {
            scan.special = true;
            return;
        }
        if scan.mixed_notaries {
            return;
        }
        let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
            return;
        };
        let Some(chosen) =
            self.resolver
                .chosen_notary(ctx.height, &pubkey, ctx.block.time, state)
        else {
            return;
        };
        let bit = if vout < 64 { 1u64 << vout } else { 0 };
        match scan.paid_notary {
            None => {
                scan.paid_notary = Some(chosen.notary_id);
                scan.notary_outputs |= bit;
            }
            Some(notary_id) if notary_id == chosen.notary_id => scan.notary_outputs |= bit,
            Some(_) => {
                scan.mixed_notaries = true;
                scan.notary_outputs = 0;
            }
        }
    }

    /// Returns whether the candidate counts for the validation-only check
    fn apply_notarization(
        &mut self,
        store: &mut ChainStateStore,
        chain: &dyn ChainView,
        ctx: &TxContext,
        scan: &mut TxScan,
        candidate: NotarizationCandidate,
    ) -> DpowResult<bool> {
        let notarized_height = candidate.notarized_height;
        scan.notarized_height = notarized_height;

        let unmatched_quorum = !candidate.matched
            && ctx.signed_mask != 0
            && ctx.signed_mask.count_ones() >= self.config.min_ratify(ctx.height);
        let notarized =
            ctx.notarized || unmatched_quorum || self.config.is_grandfathered(&candidate.symbol);
        let validated = if candidate.matched {
            self.guard.validate_chain(
                chain,
                store.state(),
                &candidate.source_block_hash,
                notarized_height,
            )
        } else {
            true
        };
        if ctx.just_check {
            return Ok(candidate.matched);
        }
        if !(notarized && validated) {
            if candidate.matched {
                debug!(
                    "{} validated.{} notarized.{} {:x} reject ht.{} NOTARIZED.{} prev.{} {}",
                    candidate.symbol,
                    validated,
                    notarized,
                    ctx.signed_mask,
                    ctx.height,
                    notarized_height,
                    store.state().last_notarized_height,
                    candidate.source_block_hash
                );
            }
            return Ok(false);
        }

        self.cc_cache.insert(CrossChainEntry {
            height: ctx.height,
            tx_index: ctx.tx_index,
            symbol: candidate.symbol.clone(),
            notarized_height,
            mom: candidate.mom,
            momom: candidate.momom.clone(),
        });

        let state = store.state();
        if !candidate.matched
            || notarized_height <= state.last_notarized_height
            || notarized_height >= ctx.height
        {
            return Ok(false);
        }
        let (mom, mom_depth) = match candidate.usable_mom() {
            Some(mom) => (mom.mom, mom.mom_depth),
            None => (state.last_notarized_mom, state.last_notarized_mom_depth),
        };
        store.append_event(Event::Notarized(NotarizedEvent {
            height: ctx.height,
            notarized_height,
            block_hash: candidate.source_block_hash,
            dest_txid: candidate.dest_txid,
            mom,
            mom_depth,
        }))?;
        info!(
            "[{}] ht.{} NOTARIZED.{} {}.{} DESTTXID.{} lens.{} MoM.{} {}",
            self.config.own_symbol,
            ctx.height,
            notarized_height,
            self.config.own_symbol,
            candidate.source_block_hash,
            candidate.dest_txid,
            candidate.payload_len,
            mom,
            mom_depth
        );
        if self.config.own_is_home() {
            self.signed_masks.append(ctx.height, ctx.signed_mask)?;
        }
        Ok(false)
    }

    fn ratify(
        &mut self,
        store: &mut ChainStateStore,
        tx: &Transaction,
        height: i32,
        signed_mask: u64,
        num_notaries: usize,
    ) -> DpowResult<()> {
        let last = tx.outputs.len() - 1;
        let pubkeys: Vec<PublicKey> = tx.outputs[1..last]
            .iter()
            .filter_map(|output| p2pk_pubkey(&output.script_pubkey))
            .filter_map(|key| PublicKey::from_slice(key).ok())
            .take(MAX_NOTARIES)
            .collect();
        let weight = signed_mask.count_ones();
        let accepted = (signed_mask & 1 != 0 && weight >= self.config.min_ratify(height))
            || weight as usize > num_notaries / 3;
        if !accepted {
            info!(
                "{}: ratification at height {} not signed enough: signedmask.{:x} wt.{} numnotaries.{}",
                self.config.own_symbol, height, signed_mask, weight, num_notaries
            );
            return Ok(());
        }
        let count = pubkeys.len();
        store.append_event(Event::Pubkeys(PubkeysEvent { height, pubkeys }))?;
        info!(
            "RATIFIED! new notaries.{} newheight.{} from height.{}",
            count,
            self.resolver.activation_height(height),
            height
        );
        Ok(())
    }
}

/// Notary spending `input`, looked up through the script of the output it spends
fn signer_index(
    chain: &dyn ChainView,
    input: &TxIn,
    notaries: &[PublicKey],
    first_notary_hash: Option<&Hash160>,
) -> Option<usize> {
    let prev = chain.get_transaction(&input.prevout.txid)?;
    let output = prev.outputs.get(usize::try_from(input.prevout.vout).ok()?)?;
    let script = &output.script_pubkey;
    let script = &script[..script.len().min(P2PK_SCRIPT_LEN)];
    notary_position(script, notaries, first_notary_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpow_exports::test_exports::test_pubkeys;
    use dpow_models::script::{p2pk_script, p2pkh_script};

    #[test]
    fn test_notary_position() {
        let notaries = test_pubkeys(3, 5);
        let first = notaries[0].hash160();
        assert_eq!(
            notary_position(&p2pk_script(&notaries[3]), &notaries, Some(&first)),
            Some(3)
        );
        assert_eq!(
            notary_position(&p2pkh_script(&notaries[0]), &notaries, Some(&first)),
            Some(0)
        );
        // only the first notary is recognised by key hash
        assert_eq!(
            notary_position(&p2pkh_script(&notaries[2]), &notaries, Some(&first)),
            None
        );
        assert_eq!(
            notary_position(&p2pk_script(&test_pubkeys(4, 1)[0]), &notaries, Some(&first)),
            None
        );
        assert_eq!(notary_position(&[0x6a, 0x01, 0x00], &notaries, None), None);
    }

    #[test]
    fn test_status_from_positions() {
        assert_eq!(ConnectStatus::from_positions(&[]).code(), 0);
        assert_eq!(
            ConnectStatus::from_positions(&[1]),
            ConnectStatus::ValidNotarization
        );
        assert_eq!(
            ConnectStatus::from_positions(&[2]),
            ConnectStatus::Invalid(ConsensusViolation::NotarizationAtWrongIndex(2))
        );
        assert_eq!(
            ConnectStatus::from_positions(&[1, 3]),
            ConnectStatus::Invalid(ConsensusViolation::MultipleNotarizations)
        );
        assert_eq!(ConnectStatus::from_positions(&[1, 3]).code(), -1);
    }
}
