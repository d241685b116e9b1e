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

use sasm::{translate, MockResolver, TranslationError};

#[test]
fn nop_encodes_single_byte() {
    let resolver = MockResolver::new();
    let program = translate("nop\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0x90]);
}

#[test]
fn mov_reg_reg() {
    let resolver = MockResolver::new();
    let program = translate("mov eax, ebx\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0x89, 0xD8]);
}

#[test]
fn mov_reg_small_immediate_still_uses_32bit_form() {
    let resolver = MockResolver::new();
    let program = translate("mov eax, 1\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn add_short_immediate() {
    let resolver = MockResolver::new();
    let program = translate("add eax, 5\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0x83, 0xC0, 0x05]);
}

#[test]
fn self_jump_uses_short_form() {
    let resolver = MockResolver::new();
    let program = translate("l:\njmp l\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0xEB, 0xFE]);
}

#[test]
fn indexed_memory_operand() {
    let resolver = MockResolver::new();
    let program = translate("mov eax, [ebx+ecx*4+10h]\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0x8B, 0x44, 0x8B, 0x10]);
}

#[test]
fn push_large_immediate() {
    let resolver = MockResolver::new();
    let program = translate("push 100h\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![0x68, 0x00, 0x01, 0x00, 0x00]);
}

#[test]
fn data_variable_offset_is_tracked_and_restorable() {
    let resolver = MockResolver::new();
    let mut program = translate("foo db \"AB\", 0\n", &resolver, false).unwrap();
    assert_eq!(program.bytes, vec![b'A', b'B', 0]);
    let offset = program.variable_offsets["foo"];
    assert_eq!(offset, 0);
    program.bytes[0] = 0xFF;
    program.restore_variables();
    assert_eq!(program.bytes, vec![b'A', b'B', 0]);
}

#[test]
fn forward_jump_defaults_to_long_form() {
    let resolver = MockResolver::new();
    let program = translate("jmp skip\nnop\nskip:\nnop\n", &resolver, false).unwrap();
    assert_eq!(&program.bytes[0..5], &[0xE9, 0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn duplicate_label_is_an_error() {
    let resolver = MockResolver::new();
    let err = translate("l:\nl:\nnop\n", &resolver, false).unwrap_err();
    assert!(matches!(err, TranslationError::DuplicateLabel { .. }));
}

#[test]
fn shadowed_local_outside_its_procedure_is_rejected() {
    let resolver = MockResolver::new();
    let source = "\
proc foo
local tmp:dword
mov eax, tmp
endp
mov eax, tmp
";
    let err = translate(source, &resolver, false).unwrap_err();
    assert!(matches!(err, TranslationError::ShadowedConstant { .. }));
}

#[test]
fn proc_with_locals_emits_matching_frame() {
    let resolver = MockResolver::new();
    let source = "\
proc foo
local tmp:dword
mov eax, tmp
ret
endp
";
    let program = translate(source, &resolver, false).unwrap();
    // push ebp; mov ebp,esp; sub esp,4; mov eax,[ebp-4]; mov esp,ebp; pop ebp; ret
    assert_eq!(program.bytes[0], 0x55); // push ebp
    assert_eq!(&program.bytes[1..3], &[0x89, 0xE5]); // mov ebp, esp
    assert_eq!(&program.bytes[3..6], &[0x83, 0xEC, 0x04]); // sub esp, 4
}

#[test]
fn invoke_pushes_arguments_right_to_left_then_calls() {
    let resolver = MockResolver::new().with_symbol("kernel32", "ExitProcess", 0x7700_1234);
    let source = "\
extern ExitProcess lib kernel32
invoke ExitProcess, 0
";
    let program = translate(source, &resolver, false).unwrap();
    // push 0; mov ecx, 0x77001234; call ecx
    assert_eq!(
        program.bytes,
        vec![0x6A, 0x00, 0xC7, 0xC1, 0x34, 0x12, 0x00, 0x77, 0xFF, 0xD1]
    );
}

#[test]
fn asmret_expands_to_full_epilog() {
    let resolver = MockResolver::new();
    let program = translate("asmret\n", &resolver, false).unwrap();
    // pop edi; pop esi; pop ebx; mov esp,ebp; pop ebp; popf; pop eax; ret
    assert_eq!(
        program.bytes,
        vec![0x5F, 0x5E, 0x5B, 0x89, 0xEC, 0x5D, 0x9D, 0x58, 0xC3]
    );
}

#[test]
fn mov_addr_bare_variable_label_emits_absolute_fixup() {
    let resolver = MockResolver::new();
    let source = "\
mydata db \"AB\", 0
mov ecx, addr mydata
";
    let program = translate(source, &resolver, true).unwrap();
    let data_offset = program.variable_offsets["mydata"] as u32;
    // prolog (8 bytes) + "AB\0" (3 bytes) puts the mov at offset 11.
    assert_eq!(
        &program.bytes[11..17],
        &[0xC7, 0xC1, data_offset as u8, (data_offset >> 8) as u8, 0, 0]
    );
}

#[test]
fn push_addr_bare_variable_label_emits_absolute_fixup() {
    let resolver = MockResolver::new();
    let source = "\
mydata db \"AB\", 0
push addr mydata
";
    let program = translate(source, &resolver, true).unwrap();
    // push addr <var> expands to: push ecx; mov ecx, <var>; add ecx, $this; xchg [esp], ecx
    // the mov's absolute fixup is what was previously unreachable.
    assert!(program.variable_offsets.contains_key("mydata"));
    // prolog (8) + data (3) + "push ecx" (1) = offset 12 for the mov.
    assert_eq!(program.bytes[12], 0xC7);
}

#[test]
fn extern_resolver_is_consulted_exactly_once_per_declaration() {
    let resolver = MockResolver::new().with_symbol("user32", "MessageBoxA", 0x1000);
    let source = "extern MessageBoxA lib user32\n";
    translate(source, &resolver, false).unwrap();
    assert_eq!(
        resolver.calls(),
        vec![("user32".to_string(), "MessageBoxA".to_string())]
    );
}
