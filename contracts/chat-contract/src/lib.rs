#[cfg(feature = "contract")]
mod contract_impl {
    use chainchat_common::{ChatStore, ChatSummary, ChatUpdate};
    use freenet_stdlib::prelude::*;

    pub struct Contract;

    fn load(state: &State<'static>) -> Result<ChatStore, ContractError> {
        if state.is_empty() {
            return Ok(ChatStore::default());
        }
        serde_json::from_slice(state.as_ref()).map_err(|e| ContractError::Deser(e.to_string()))
    }

    fn apply_update(store: &mut ChatStore, bytes: &[u8]) -> Result<(), ContractError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let update: ChatUpdate =
            serde_json::from_slice(bytes).map_err(|e| ContractError::Deser(e.to_string()))?;
        store
            .apply_update(update)
            .map_err(|e| ContractError::Other(e.to_string()))?;
        Ok(())
    }

    fn merge_full_state(store: &mut ChatStore, bytes: &[u8]) -> Result<(), ContractError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let other: ChatStore =
            serde_json::from_slice(bytes).map_err(|e| ContractError::Deser(e.to_string()))?;
        store
            .merge_state(&other)
            .map_err(|e| ContractError::Other(e.to_string()))
    }

    #[contract]
    impl ContractInterface for Contract {
        fn validate_state(
            _parameters: Parameters<'static>,
            state: State<'static>,
            _related: RelatedContracts<'static>,
        ) -> Result<ValidateResult, ContractError> {
            if state.is_empty() {
                return Ok(ValidateResult::Valid);
            }

            // Registry injectivity is enforced while deserializing.
            let store: ChatStore = match serde_json::from_slice(state.as_ref()) {
                Ok(store) => store,
                Err(_) => return Ok(ValidateResult::Invalid),
            };

            if store.validate().is_err() {
                return Ok(ValidateResult::Invalid);
            }

            Ok(ValidateResult::Valid)
        }

        fn update_state(
            _parameters: Parameters<'static>,
            state: State<'static>,
            data: Vec<UpdateData<'static>>,
        ) -> Result<UpdateModification<'static>, ContractError> {
            let mut store = load(&state)?;

            for ud in data {
                match ud {
                    UpdateData::State(s) => {
                        merge_full_state(&mut store, s.as_ref())?;
                    }
                    UpdateData::Delta(d) => {
                        apply_update(&mut store, d.as_ref())?;
                    }
                    UpdateData::StateAndDelta { state, delta } => {
                        merge_full_state(&mut store, state.as_ref())?;
                        apply_update(&mut store, delta.as_ref())?;
                    }
                    _ => return Err(ContractError::InvalidUpdate),
                }
            }

            let serialized =
                serde_json::to_vec(&store).map_err(|e| ContractError::Other(e.to_string()))?;
            Ok(UpdateModification::valid(State::from(serialized)))
        }

        fn summarize_state(
            _parameters: Parameters<'static>,
            state: State<'static>,
        ) -> Result<StateSummary<'static>, ContractError> {
            if state.is_empty() {
                return Ok(StateSummary::from(vec![]));
            }

            let store = load(&state)?;
            let serialized = serde_json::to_vec(&store.summarize())
                .map_err(|e| ContractError::Other(e.to_string()))?;
            Ok(StateSummary::from(serialized))
        }

        fn get_state_delta(
            _parameters: Parameters<'static>,
            state: State<'static>,
            summary: StateSummary<'static>,
        ) -> Result<StateDelta<'static>, ContractError> {
            if state.is_empty() {
                return Ok(StateDelta::from(vec![]));
            }

            let store = load(&state)?;

            let summary: ChatSummary = if summary.is_empty() {
                ChatSummary::default()
            } else {
                serde_json::from_slice(summary.as_ref())
                    .map_err(|e| ContractError::Deser(e.to_string()))?
            };

            // Deltas travel as sync updates so `update_state` can tell them
            // apart from caller commands.
            let delta_bytes = match store.delta(&summary) {
                Some(delta) => serde_json::to_vec(&ChatUpdate::Sync(delta))
                    .map_err(|e| ContractError::Other(e.to_string()))?,
                None => vec![],
            };
            Ok(StateDelta::from(delta_bytes))
        }
    }
}
