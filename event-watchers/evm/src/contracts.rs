// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bindings of the contracts the relayer reads from and writes to.
#![allow(missing_docs)]

use ethers::contract::abigen;

abigen!(
    StrategyManagerContract,
    r#"[
        event Deposit(address staker, address token, address strategy, uint256 shares)
    ]"#
);

abigen!(
    DelegationManagerContract,
    r#"[
        struct Withdrawal { address staker; address delegatedTo; address withdrawer; uint256 nonce; uint32 startTimestamp; address[] strategies; uint256[] shares; }
        event StakerDelegated(address indexed staker, address indexed operator)
        event StakerUndelegated(address indexed staker, address indexed operator)
        event WithdrawalQueued(bytes32 withdrawalRoot, Withdrawal withdrawal)
    ]"#
);

abigen!(
    RegistryInteractorContract,
    r#"[
        struct SignatureWithSaltAndExpiry { bytes signature; bytes32 salt; uint256 expiry; }
        event RegisterCentralScheduler(address registryRouter, address centralScheduler, SignatureWithSaltAndExpiry approverSignature)
        event RegisterStakeManager(address registryRouter, address stakeManager)
        event RegisterEjectionManager(address registryRouter, address ejectionManager)
    ]"#
);

abigen!(
    ConnectorContract,
    r#"[
        event MessageSent(address txSenderAddress, uint256 destinationChainId, bytes destinationAddress, bytes message, uint256 valueAndGas, uint256 destinationGasLimit, bytes params)
        event BridgeMessageFailed(bytes32 indexed jobIndex, bytes reason)
        function receiveCall(bytes sender, uint256 sourceChainId, address destinationAddress, bytes message, bytes32 jobIndex)
        function onReceive(bytes sender, uint256 sourceChainId, address destinationAddress, uint256 value, bytes message, bytes32 jobIndex)
    ]"#
);

abigen!(
    Erc20Contract,
    r#"[
        function balanceOf(address account) external view returns (uint256)
    ]"#
);
