//! Trained model: symbol tables, attribute index, weights, and settings.

pub(crate) mod attributes;
pub mod info;
pub mod lexicon;
pub mod tagset;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::errors::{LegatoError, Result};
use crate::model::attributes::AttributeIndex;
use crate::model::info::ModelInfo;
use crate::model::lexicon::Lexicon;
use crate::model::tagset::TagSet;

/// File names inside a model directory.
const LEXICON_FILE: &str = "lexicon";
const TAGS_FILE: &str = "tags";
const ATTRIBUTES_FILE: &str = "attributes";
const FEATURES_FILE: &str = "features";
const INFO_FILE: &str = "info";

/// A trained linear-chain CRF model.
pub struct Model {
    pub(crate) lexicon: Lexicon,
    pub(crate) tags: TagSet,
    pub(crate) attributes: AttributeIndex,
    pub(crate) info: ModelInfo,
    pub(crate) weights: Vec<f64>,
}

impl Model {
    /// Gets the reference to the word symbol table.
    #[inline(always)]
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Gets the reference to the label symbol table.
    #[inline(always)]
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Gets the number of labels, reserved ones included.
    #[inline(always)]
    pub fn num_tags(&self) -> usize {
        self.tags.len()
    }

    /// Gets the model settings.
    #[inline(always)]
    pub fn info(&self) -> ModelInfo {
        self.info
    }

    /// Exports the model into the five sinks of the persisted layout.
    ///
    /// # Errors
    ///
    /// [`LegatoError`] is returned when writing fails.
    pub fn write<L, T, A, F, I>(
        &self,
        lexicon_wtr: L,
        tags_wtr: T,
        attributes_wtr: A,
        features_wtr: F,
        info_wtr: I,
        preface: &str,
    ) -> Result<()>
    where
        L: Write,
        T: Write,
        A: Write,
        F: Write,
        I: Write,
    {
        let mut lexicon_wtr = BufWriter::new(lexicon_wtr);
        let mut tags_wtr = BufWriter::new(tags_wtr);
        let mut attributes_wtr = BufWriter::new(attributes_wtr);
        let mut features_wtr = BufWriter::new(features_wtr);
        let mut info_wtr = BufWriter::new(info_wtr);

        self.lexicon.write(&mut lexicon_wtr, preface)?;
        self.tags.write(&mut tags_wtr, preface)?;
        self.attributes.write_attributes(&mut attributes_wtr, preface)?;
        self.attributes
            .write_features(&mut features_wtr, &self.weights, preface)?;
        self.info.write(&mut info_wtr, preface)?;
        Ok(())
    }

    /// Creates a model from the five sources of the persisted layout.
    ///
    /// # Errors
    ///
    /// [`LegatoError::Io`] is returned on a malformed file;
    /// [`LegatoError::Internal`] when the counts recorded in `info` disagree
    /// with the `attributes` or `features` files.
    pub fn read<L, T, A, F, I>(
        lexicon_rdr: L,
        tags_rdr: T,
        attributes_rdr: A,
        features_rdr: F,
        info_rdr: I,
    ) -> Result<Self>
    where
        L: BufRead,
        T: BufRead,
        A: BufRead,
        F: BufRead,
        I: BufRead,
    {
        let mut lexicon_rdr = lexicon_rdr;
        let mut tags_rdr = tags_rdr;
        let mut attributes_rdr = attributes_rdr;
        let mut features_rdr = features_rdr;
        let mut info_rdr = info_rdr;

        let info = ModelInfo::read(INFO_FILE, &mut info_rdr)?;
        let lexicon = Lexicon::read(LEXICON_FILE, &mut lexicon_rdr)?;
        let tags = TagSet::read(TAGS_FILE, &mut tags_rdr)?;
        let mut attributes = AttributeIndex::read_attributes(ATTRIBUTES_FILE, &mut attributes_rdr)?;
        if attributes.num_attributes() != info.nattributes {
            return Err(LegatoError::internal(format!(
                "number of attributes read ({}) is not equal to configuration value ({})",
                attributes.num_attributes(),
                info.nattributes,
            )));
        }
        let weights = attributes.read_features(FEATURES_FILE, &mut features_rdr, info.nfeatures)?;

        Ok(Self {
            lexicon,
            tags,
            attributes,
            info,
            weights,
        })
    }

    /// Writes the model files into a directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// [`LegatoError`] is returned when a file cannot be created.
    pub fn save<P>(&self, dir: P, preface: &str) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| LegatoError::io(dir.display().to_string(), e.to_string()))?;
        let create = |name: &str| {
            File::create(dir.join(name))
                .map_err(|e| LegatoError::io(dir.join(name).display().to_string(), e.to_string()))
        };
        self.write(
            create(LEXICON_FILE)?,
            create(TAGS_FILE)?,
            create(ATTRIBUTES_FILE)?,
            create(FEATURES_FILE)?,
            create(INFO_FILE)?,
            preface,
        )
    }

    /// Loads a model saved by [`Model::save`].
    ///
    /// # Errors
    ///
    /// [`LegatoError`] is returned when a file is missing or malformed.
    pub fn load<P>(dir: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        let open = |name: &str| {
            File::open(dir.join(name))
                .map(BufReader::new)
                .map_err(|e| LegatoError::io(dir.join(name).display().to_string(), e.to_string()))
        };
        Self::read(
            open(LEXICON_FILE)?,
            open(TAGS_FILE)?,
            open(ATTRIBUTES_FILE)?,
            open(FEATURES_FILE)?,
            open(INFO_FILE)?,
        )
    }
}
