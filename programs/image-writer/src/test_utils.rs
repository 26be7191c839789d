use crate::state::{ImageData, ImageProcessor};
use anchor_lang::prelude::*;
use mollusk_svm::{result::InstructionResult, Mollusk};
use solana_sdk::{account::Account, instruction::Instruction, native_loader, system_program};

/// Anchor error code offset
pub const ANCHOR_ERROR_OFFSET: u32 = 6000;

pub fn setup_mollusk() -> Mollusk {
    Mollusk::new(&crate::ID, crate::get_image_writer_program_path())
}

/// Build instruction for the image-writer program
pub fn build_instruction<T: anchor_lang::InstructionData>(
    instruction_data: T,
    accounts: Vec<anchor_lang::prelude::AccountMeta>,
) -> Instruction {
    Instruction {
        program_id: crate::ID,
        accounts,
        data: instruction_data.data(),
    }
}

pub fn get_processor_pda(seed_key: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            ImageProcessor::SEED,
            seed_key.as_ref(),
            ImageProcessor::PROCESSOR_SEED,
        ],
        &crate::ID,
    )
}

pub fn get_image_pda(seed_key: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ImageData::SEED, seed_key.as_ref()], &crate::ID)
}

pub fn create_signer_account() -> Account {
    Account {
        lamports: 10_000_000_000,
        data: vec![],
        owner: system_program::ID,
        executable: false,
        rent_epoch: 0,
    }
}

pub fn create_uninitialized_account() -> Account {
    Account {
        lamports: 0,
        data: vec![],
        owner: system_program::ID,
        executable: false,
        rent_epoch: 0,
    }
}

pub fn create_system_program_account() -> (Pubkey, Account) {
    (
        system_program::ID,
        Account {
            lamports: 0,
            data: vec![],
            owner: native_loader::ID,
            executable: true,
            rent_epoch: 0,
        },
    )
}

/// Upload parameters for a processor fixture
pub struct ProcessorFixture {
    pub owner: Pubkey,
    pub seed_key: Pubkey,
    pub total_bytes: u64,
    pub chunk_size: u32,
    pub bytes_written: u64,
    pub closed: bool,
}

impl ProcessorFixture {
    pub fn new(owner: Pubkey, total_bytes: u64, chunk_size: u32) -> Self {
        Self {
            owner,
            seed_key: Pubkey::new_unique(),
            total_bytes,
            chunk_size,
            bytes_written: 0,
            closed: false,
        }
    }

    pub fn processor(&self) -> ImageProcessor {
        let (_, bump) = get_processor_pda(&self.seed_key);
        let (image, image_bump) = get_image_pda(&self.seed_key);
        ImageProcessor {
            bump,
            image_bump,
            owner: self.owner,
            seed_key: self.seed_key,
            image,
            total_bytes: self.total_bytes,
            chunk_size: self.chunk_size,
            bytes_written: self.bytes_written,
            closed: self.closed,
        }
    }

    /// Processor account plus an image account whose first `bytes_written` bytes are `prefix`.
    pub fn accounts(&self, prefix: &[u8]) -> [(Pubkey, Account); 2] {
        assert_eq!(prefix.len() as u64, self.bytes_written);

        let (processor_pda, _) = get_processor_pda(&self.seed_key);
        let (image_pda, _) = get_image_pda(&self.seed_key);

        let mut processor_data = vec![0u8; 8 + ImageProcessor::INIT_SPACE];
        processor_data[0..8].copy_from_slice(ImageProcessor::DISCRIMINATOR);
        self.processor()
            .serialize(&mut &mut processor_data[8..])
            .unwrap();

        let mut image_data = vec![0u8; ImageData::SPACE];
        image_data[0..8].copy_from_slice(ImageData::DISCRIMINATOR);
        image_data[ImageData::OWNER_OFFSET..ImageData::OWNER_OFFSET + 32]
            .copy_from_slice(self.owner.as_ref());
        image_data[ImageData::TOTAL_BYTES_OFFSET..ImageData::TOTAL_BYTES_OFFSET + 8]
            .copy_from_slice(&self.total_bytes.to_le_bytes());
        image_data[ImageData::DATA_OFFSET..ImageData::DATA_OFFSET + prefix.len()]
            .copy_from_slice(prefix);

        [
            (
                processor_pda,
                Account {
                    lamports: 1_000_000_000,
                    data: processor_data,
                    owner: crate::ID,
                    executable: false,
                    rent_epoch: 0,
                },
            ),
            (
                image_pda,
                Account {
                    lamports: 1_000_000_000,
                    data: image_data,
                    owner: crate::ID,
                    executable: false,
                    rent_epoch: 0,
                },
            ),
        ]
    }
}

fn find_account<'a>(result: &'a InstructionResult, pda: &Pubkey) -> &'a Account {
    result
        .resulting_accounts
        .iter()
        .find(|(pubkey, _)| pubkey == pda)
        .map(|(_, account)| account)
        .expect("account not found in result")
}

/// Deserialize the processor from an instruction result
pub fn get_processor_from_result(result: &InstructionResult, pda: &Pubkey) -> ImageProcessor {
    let account = find_account(result, pda);
    anchor_lang::AccountDeserialize::try_deserialize(&mut &account.data[..])
        .expect("Failed to deserialize image processor")
}

/// Raw image buffer (without header) from an instruction result
pub fn get_image_buffer_from_result(result: &InstructionResult, pda: &Pubkey) -> Vec<u8> {
    let account = find_account(result, pda);
    assert_eq!(&account.data[0..8], ImageData::DISCRIMINATOR);
    account.data[ImageData::DATA_OFFSET..].to_vec()
}

pub fn get_image_type_from_result(result: &InstructionResult, pda: &Pubkey) -> u8 {
    find_account(result, pda).data[ImageData::IMAGE_TYPE_OFFSET]
}
