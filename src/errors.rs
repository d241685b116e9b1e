/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranslationError {
    #[error("duplicate constant \"{name}\": {reason}")]
    DuplicateConstant { name: String, reason: String },

    #[error("duplicate label \"{name}\": {reason}")]
    DuplicateLabel { name: String, reason: String },

    #[error("duplicate extern \"{name}\": {reason}")]
    DuplicateExtern { name: String, reason: String },

    #[error("shadowed constant \"{name}\" used outside its procedure: {reason}")]
    ShadowedConstant { name: String, reason: String },

    #[error("bad address operand in \"{reason}\"")]
    BadAddress { reason: String },

    #[error("bad operand combination in \"{reason}\"")]
    BadOperandCombination { reason: String },

    #[error("immediate does not fit in \"{reason}\"")]
    BadImmediate { reason: String },

    #[error("unknown mnemonic in \"{reason}\"")]
    UnknownMnemonic { reason: String },

    #[error("malformed extern declaration: \"{reason}\"")]
    BadExternSyntax { reason: String },

    #[error("malformed local/argument declaration: \"{reason}\"")]
    BadLocalSyntax { reason: String },

    #[error("undefined label \"{name}\"")]
    UndefinedLabel { name: String },
}
