/*!
Reports computed from finished simulations

# Per-run reports

- [`ChainRatios`] measures how much of the preferred chain the colluders
  own, as seen by the ring leader (or peer 0 without one).
- [`ChainDump`] lists every block of a peer's ledger as tab-separated
  records.
- [`TrustReport`] lists a peer's trust record for each public neighbour.

# Working with [`ResultsBuilder`]

Creating a [`ResultsTable`] after running a simulation group:

```
use p2p_mining_sim::prelude::*;

let group = SimulationBuilder::new()
    .peers(4)
    .malicious([3])
    .horizon(2_000.0)
    .repeat_all(2)
    .build()
    .unwrap();

let results = group
    .run_all()
    .average(Average::Median) // Take the median of repeated simulations' results
    .all()
    .format(Format::CSV)      // Output results as CSV
    .build();

println!("{}", results);
```
*/

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    num::NonZeroUsize,
};

use crate::{
    blockchain::Blockchain,
    peer::{Peer, PeerId},
    power_dist::PowerValue,
    simulation::{Roster, SimTime, SimulationOutput},
    utils::median_of_floats,
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Share of malicious blocks in a ledger's preferred chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRatios {
    /// Blocks on the preferred chain, genesis excluded.
    pub chain_length: usize,
    /// Blocks on the preferred chain mined by malicious peers.
    pub malicious_in_chain: usize,
    /// Blocks anywhere in the tree mined by malicious peers.
    pub malicious_total: usize,
}

impl ChainRatios {
    pub fn new(chain: &Blockchain, roster: &Roster) -> Self {
        let is_malicious = |miner: Option<PeerId>| {
            miner.is_some_and(|m| roster.is_malicious(m))
        };

        let current = chain.current_chain();
        let malicious_in_chain =
            current.iter().filter(|b| is_malicious(b.miner())).count();
        let malicious_total =
            chain.blocks().filter(|b| is_malicious(b.miner())).count();

        Self {
            chain_length: current.len(),
            malicious_in_chain,
            malicious_total,
        }
    }

    /// Ratios of the output's observer peer.
    pub fn from_output(output: &SimulationOutput) -> Option<Self> {
        output
            .observer()
            .map(|peer| Self::new(peer.chain(), &output.roster))
    }

    /// Malicious blocks in the chain over the chain length.
    pub fn malicious_share(&self) -> f64 {
        ratio(self.malicious_in_chain, self.chain_length)
    }

    /// Malicious blocks in the chain over all malicious blocks mined.
    pub fn malicious_acceptance(&self) -> f64 {
        ratio(self.malicious_in_chain, self.malicious_total)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl Display for ChainRatios {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malicious Chain: {}", self.malicious_in_chain)?;
        writeln!(f, "Total Blocks Chain: {}", self.chain_length)?;
        writeln!(f, "Total Malicious: {}", self.malicious_total)?;
        writeln!(
            f,
            "Malicious Blocks in Chain / Total Blocks in Longest Chain: {:.1$}",
            self.malicious_share(),
            FLOAT_PRECISION_DIGITS
        )?;
        write!(
            f,
            "Malicious Blocks in Chain / Total Malicious Blocks: {:.1$}",
            self.malicious_acceptance(),
            FLOAT_PRECISION_DIGITS
        )
    }
}

/// Tab-separated listing of a ledger, with blocks mined by the ring
/// leader marked `Malicious`.
#[derive(Debug, Clone, Copy)]
pub struct ChainDump<'a> {
    chain: &'a Blockchain,
    roster: &'a Roster,
}

impl<'a> ChainDump<'a> {
    pub fn new(chain: &'a Blockchain, roster: &'a Roster) -> Self {
        Self { chain, roster }
    }
}

impl Display for ChainDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dump = self.chain.dump(|block| {
            block.miner().is_some_and(|m| self.roster.is_ring_leader(m))
        });
        f.write_str(&dump)
    }
}

/// One line per public neighbour of a peer with its trust record.
#[derive(Debug, Clone, Copy)]
pub struct TrustReport<'a> {
    peer: &'a Peer,
}

impl<'a> TrustReport<'a> {
    pub fn new(peer: &'a Peer) -> Self {
        Self { peer }
    }
}

impl Display for TrustReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for neighbour in self.peer.neighbours() {
            if let Some(record) = self.peer.trust_of(*neighbour) {
                writeln!(f, "{}: {}", neighbour, record)?;
            }
        }
        Ok(())
    }
}

/// Builder for [`ResultsTable`]. Typically produced by running a
/// [`SimulationGroup`](crate::simulation::SimulationGroup).
#[derive(Debug)]
pub struct ResultsBuilder {
    average: Average,
    columns: BTreeSet<Column>,
    data: Vec<SimulationOutput>,
    format: Format,
    repeated: NonZeroUsize,
}

/// Describes the appearance of a [`ResultsTable`] table as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

impl ResultsBuilder {
    /// Create a new [`ResultsBuilder`].
    pub(crate) fn new(
        data: Vec<SimulationOutput>,
        repeated: NonZeroUsize,
    ) -> Self {
        Self {
            data,
            repeated,
            average: Average::default(),
            columns: BTreeSet::default(),
            format: Format::default(),
        }
    }

    /// Include every column.
    ///
    /// [`ResultsBuilder::average`] must still be called separately
    /// to create averaged data.
    pub fn all(self) -> Self {
        self.blocks_published()
            .longest_chain_length()
            .malicious_share()
            .malicious_acceptance()
            .horizon()
    }

    /// Average the results of repeated simulations based on the given
    /// [`Average`] type. For types other than [`Average::None`], a column
    /// describing the averaging method will be included in the results table.
    pub fn average(mut self, average: Average) -> Self {
        self.average = average;

        self
    }

    /// Include the "Blocks Published" column: blocks in the observer's
    /// tree, genesis excluded.
    pub fn blocks_published(mut self) -> Self {
        self.columns.insert(Column::BlocksPublished);

        self
    }

    /// Extract the raw [`SimulationOutput`] data from this [`ResultsBuilder`].
    /// Useful for running custom statistical analysis.
    ///
    /// # Ordering
    /// Simulations are run in the same order they are specified using
    /// [`SimulationBuilder`](crate::simulation::SimulationBuilder), with
    /// repeated runs being grouped together. The output data from this method
    /// follows this ordering as well.
    pub fn data(self) -> Vec<SimulationOutput> {
        self.data
    }

    /// Include the "Longest Chain Length" column.
    pub fn longest_chain_length(mut self) -> Self {
        self.columns.insert(Column::LongestChainLength);

        self
    }

    /// Include the "Malicious Share" column, see
    /// [`ChainRatios::malicious_share`].
    pub fn malicious_share(mut self) -> Self {
        self.columns.insert(Column::MaliciousShare);

        self
    }

    /// Include the "Malicious Acceptance" column, see
    /// [`ChainRatios::malicious_acceptance`].
    pub fn malicious_acceptance(mut self) -> Self {
        self.columns.insert(Column::MaliciousAcceptance);

        self
    }

    /// Include the "Horizon" column.
    pub fn horizon(mut self) -> Self {
        self.columns.insert(Column::Horizon);

        self
    }

    /// Specify the [`Format`] of the results table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Create new [`ResultsTable`].
    pub fn build(self) -> ResultsTable {
        let ResultsBuilder { average, mut columns, data, format, repeated } =
            self;

        columns.insert(Column::LeaderPower);
        if average != Average::None {
            columns.insert(Column::AverageOf(average));
        }

        let columns = Vec::from_iter(columns);
        let rows = match average {
            Average::None => data
                .iter()
                .map(|output| {
                    columns.iter().map(|col| col.get_value(output)).collect()
                })
                .collect(),
            _ => data
                .chunks(repeated.get())
                .map(|outputs| {
                    columns
                        .iter()
                        .map(|col| col.get_average_value(average, outputs))
                        .collect()
                })
                .collect(),
        };

        ResultsTable { columns, format, rows }
    }
}

/// Formatted results from the completion of a
/// [`SimulationGroup`](crate::simulation::SimulationGroup). The results table
/// is given by the struct's [`Display`] implementation, as specified by
/// its [`Format`].
#[derive(Debug)]
pub struct ResultsTable {
    columns: Vec<Column>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let titles: Vec<_> =
            self.columns.iter().map(|col| col.to_string()).collect();

        match self.format {
            Format::CSV => {
                write!(f, "{}", titles.join(","))?;

                for row in self.rows.iter() {
                    writeln!(f)?;

                    let row: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();

                    write!(f, "{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();

                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        let val = val.to_string();
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in titles.into_iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width = text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in self.rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val.to_string(),
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Methods of extracting an average/central value from a set of repeated
/// simulations.
///
/// In the process of creating an results table, the given averaging method is
/// only applied to the values of columns which change between runs.
#[repr(u8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Average {
    #[default]
    /// Include all repeated values.
    None,
    /// Arithmetic mean of all values.
    Mean,
    /// Median of all values.
    Median,
    /// Maximum of all values.
    Max,
    /// Minimum of all values.
    Min,
}

/// Type of column that can appear in a data table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Column {
    // Variant order determines the order of columns in results tables
    LeaderPower,
    Horizon,
    AverageOf(Average),
    BlocksPublished,
    LongestChainLength,
    MaliciousShare,
    MaliciousAcceptance,
}

/// Value which corresponds to a [`Column`].
#[derive(Debug, Clone)]
enum ColumnValue {
    LeaderPower(PowerValue),
    Horizon(SimTime),
    AverageOf(usize),
    Float(f64),
}

fn leader_power(output: &SimulationOutput) -> PowerValue {
    output
        .roster
        .ring_leader()
        .and_then(|leader| output.power.get(leader.get()).copied())
        .unwrap_or_default()
}

impl Column {
    /// Value of a column which differs between repeated runs.
    fn measure(&self, output: &SimulationOutput) -> Option<f64> {
        let ratios = ChainRatios::from_output(output);

        match self {
            Self::BlocksPublished => output
                .observer()
                .map(|peer| peer.chain().num_blocks().saturating_sub(1) as f64),
            Self::LongestChainLength => {
                ratios.map(|r| r.chain_length as f64)
            }
            Self::MaliciousShare => ratios.map(|r| r.malicious_share()),
            Self::MaliciousAcceptance => {
                ratios.map(|r| r.malicious_acceptance())
            }
            Self::LeaderPower | Self::Horizon | Self::AverageOf(_) => None,
        }
    }

    fn get_value(&self, output: &SimulationOutput) -> ColumnValue {
        match self {
            Self::LeaderPower => ColumnValue::LeaderPower(leader_power(output)),
            Self::Horizon => ColumnValue::Horizon(output.horizon),
            Self::AverageOf(_) => ColumnValue::AverageOf(1),
            _ => ColumnValue::Float(self.measure(output).unwrap_or_default()),
        }
    }

    fn get_average_value(
        &self,
        method: Average,
        data: &[SimulationOutput],
    ) -> ColumnValue {
        match self {
            Self::AverageOf(_) => return ColumnValue::AverageOf(data.len()),
            Self::LeaderPower | Self::Horizon => match data.first() {
                Some(output) => return self.get_value(output),
                None => return ColumnValue::Float(0.0),
            },
            _ => (),
        }

        let vls: Vec<_> = data
            .iter()
            .map(|output| self.measure(output).unwrap_or_default())
            .collect();
        if vls.is_empty() {
            return ColumnValue::Float(0.0);
        }

        let avg = match method {
            Average::Mean => vls.iter().sum::<f64>() / vls.len() as f64,
            Average::Median => median_of_floats(vls),
            Average::Max => vls.into_iter().fold(f64::MIN, f64::max),
            Average::Min => vls.into_iter().fold(f64::MAX, f64::min),
            Average::None => vls[0],
        };

        ColumnValue::Float(avg)
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AverageOf(method) => match method {
                Average::Mean => write!(f, "Mean Of"),
                Average::Median => write!(f, "Median Of"),
                Average::Max => write!(f, "Max Of"),
                Average::Min => write!(f, "Min Of"),
                Average::None => write!(f, "Runs"),
            },
            Self::BlocksPublished => write!(f, "Blocks Published"),
            Self::Horizon => write!(f, "Horizon"),
            Self::LeaderPower => write!(f, "Ring Leader Power"),
            Self::LongestChainLength => write!(f, "Longest Chain Length"),
            Self::MaliciousShare => write!(f, "Malicious Share"),
            Self::MaliciousAcceptance => write!(f, "Malicious Acceptance"),
        }
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AverageOf(repeats) => write!(f, "{}", repeats),
            Self::Horizon(time) => write!(f, "{:.1}", time),
            Self::LeaderPower(value) | Self::Float(value) => {
                write!(f, "{:.1$}", value, FLOAT_PRECISION_DIGITS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        block::{Block, BlockHash},
        blockchain::LedgerParams,
        transaction::TxPool,
    };

    use super::*;

    fn roster() -> Roster {
        Roster::new(
            vec![false, true, true],
            vec![false, true, true],
            Some(1.into()),
        )
    }

    fn mine(chain: &mut Blockchain, parent: &BlockHash, miner: usize) -> Block {
        let height = chain.get(parent).unwrap().height() + 1;
        let time = height as f64;
        let block =
            Block::new(vec![], miner.into(), height, parent.clone(), time);
        chain.insert(block.clone(), time, &mut TxPool::new()).unwrap();
        block
    }

    #[test]
    fn ratios_count_malicious_blocks() {
        let params = LedgerParams {
            num_peers: 3,
            initial_balance: 0.0,
            mining_reward: 50.0,
        };
        let mut chain = Blockchain::with_genesis(params);

        // genesis <- h1 <- m2 <- h3, plus a stale malicious fork off h1
        let h1 = mine(&mut chain, &BlockHash::genesis(), 0);
        let m2 = mine(&mut chain, h1.hash(), 1);
        let h3 = mine(&mut chain, m2.hash(), 0);
        mine(&mut chain, h1.hash(), 2);
        assert_eq!(chain.current_leaf(), h3.hash());

        let ratios = ChainRatios::new(&chain, &roster());
        assert_eq!(
            ratios,
            ChainRatios {
                chain_length: 3,
                malicious_in_chain: 1,
                malicious_total: 2,
            }
        );
        assert!((ratios.malicious_share() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(ratios.malicious_acceptance(), 0.5);

        // Only ring leader blocks are marked in dumps
        let dump = ChainDump::new(&chain, &roster()).to_string();
        assert_eq!(dump.lines().count(), 4);
        assert_eq!(dump.matches("Malicious").count(), 1);
    }

    #[test]
    fn empty_chain_ratios_are_zero() {
        let ratios = ChainRatios {
            chain_length: 0,
            malicious_in_chain: 0,
            malicious_total: 0,
        };

        assert_eq!(ratios.malicious_share(), 0.0);
        assert_eq!(ratios.malicious_acceptance(), 0.0);
    }
}
